//! `tempo run`: drive the configured APB self-check bench.
//!
//! Prints the report on stdout as text or JSON. Returns exit code 1 when a
//! transfer failed or any element did not read back as written.

use std::path::PathBuf;

use tempo_bus::Response;

use crate::bench::{run_bench, BenchReport, Check};
use crate::project;
use crate::{GlobalArgs, ReportFormat, RunArgs};

/// Runs the `tempo run` command.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = project::load(global)?;
    let trace = if args.no_trace {
        None
    } else {
        args.output
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| project.config.simulation.trace.as_ref().map(|p| project.root.join(p)))
    };
    tracing::debug!(root = %project.root.display(), trace = ?trace, "resolved project");

    if !global.quiet {
        eprintln!(
            "   Running {}-bit APB bench ({} element burst)",
            project.config.bus.data_width, project.config.bus.burst
        );
    }

    let report = match project.config.bus.data_width {
        8 => run_bench::<u8>(&project, trace.as_deref())?,
        16 => run_bench::<u16>(&project, trace.as_deref())?,
        32 => run_bench::<u32>(&project, trace.as_deref())?,
        width => return Err(format!("unsupported bus data width {width}").into()),
    };

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => {
            if !global.quiet || !report.passed() {
                for line in render_text(&report) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(if report.passed() { 0 } else { 1 })
}

fn describe(response: &Response) -> String {
    match response {
        Response::Okay => "okay".to_string(),
        Response::Error(fault) => fault.to_string(),
    }
}

fn render_text(report: &BenchReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "   Bus {} on '{}': {} x {}-bit, {} wait state(s)",
            report.bus, report.bus_clock, report.elements, report.data_width, report.wait_states
        ),
        format!("   Write: {}", describe(&report.write)),
        format!("   Read:  {}", describe(&report.read)),
        format!(
            "   Monitor: {} transfer(s), {} violation(s)",
            report.transfers,
            report.violations.len()
        ),
    ];
    for violation in &report.violations {
        lines.push(format!("   violation: {violation}"));
    }
    for m in &report.mismatches {
        let check = match m.check {
            Check::ReadBack => "read-back",
            Check::Peek => "peek",
        };
        lines.push(format!(
            "   mismatch ({check}) element {} at {:#x}: expected {:#x}, got {:#x}",
            m.index, m.address, m.expected, m.actual
        ));
    }
    lines.push(format!(
        "   Finished at {} after {} step(s)",
        report.summary.final_time, report.summary.steps
    ));
    if let Some(path) = &report.trace {
        lines.push(format!("   Trace: {}", path.display()));
    }
    lines.push(if report.passed() {
        "   PASSED".to_string()
    } else {
        format!("   FAILED: {} mismatch(es)", report.mismatches.len())
    });
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run_in(toml: &str, args: RunArgs) -> (TempDir, i32) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(tempo_config::CONFIG_FILE), toml).unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(tmp.path().to_str().unwrap().to_string()),
        };
        let code = run(&args, &global).unwrap();
        (tmp, code)
    }

    fn args() -> RunArgs {
        RunArgs {
            output: None,
            no_trace: false,
            format: ReportFormat::Text,
        }
    }

    #[test]
    fn passing_bench_exits_zero_and_writes_configured_trace() {
        let toml = "[simulation]\ntrace = \"out/apb.vcd.gz\"\n[clocks.pclk]\nperiod = \"10ns\"\n";
        let (tmp, code) = run_in(toml, args());
        assert_eq!(code, 0);
        assert!(tmp.path().join("out/apb.vcd.gz").is_file());
    }

    #[test]
    fn no_trace_skips_the_file() {
        let toml = "[simulation]\ntrace = \"apb.vcd\"\n[clocks.pclk]\nperiod = \"10ns\"\n";
        let (tmp, code) = run_in(
            toml,
            RunArgs {
                no_trace: true,
                ..args()
            },
        );
        assert_eq!(code, 0);
        assert!(!tmp.path().join("apb.vcd").exists());
    }

    #[test]
    fn failing_bench_exits_one() {
        let toml = "[clocks.pclk]\nperiod = \"10ns\"\n[bus]\nerror_above = 0\n";
        let (_tmp, code) = run_in(
            toml,
            RunArgs {
                format: ReportFormat::Json,
                ..args()
            },
        );
        assert_eq!(code, 1);
    }

    #[test]
    fn text_report_names_failures() {
        let project = project::Project {
            root: PathBuf::from("."),
            config: tempo_config::load_config_from_str(
                "[clocks.pclk]\nperiod = \"10ns\"\n[bus]\nerror_above = 1\nburst = 2\n",
            )
            .unwrap(),
        };
        let report = run_bench::<u8>(&project, None).unwrap();
        let text = render_text(&report).join("\n");
        assert!(text.contains("answered with an error"), "{text}");
        assert!(text.contains("mismatch (peek) element 1 at 0x1"), "{text}");
        assert!(text.ends_with("FAILED: 2 mismatch(es)"), "{text}");
    }
}
