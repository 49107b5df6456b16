//! Trace recording for simulation output.
//!
//! The [`TraceRecorder`] trait is the interface the simulation uses once per
//! tick: it hands the recorder an integer timestamp in the recorder's own
//! precision and the recorder samples whatever it is watching.
//! [`VcdRecorder`] implements it on top of the IEEE 1364 Value Change Dump
//! format, sampling a set of [`Probe`]s and writing only the values that
//! changed since the previous record.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempo_common::TimeValue;

use crate::error::SimError;
use crate::signal::Probe;

/// Receives one record call per simulation step.
pub trait TraceRecorder {
    /// The duration of one timestamp unit.
    fn precision(&self) -> TimeValue;

    /// Samples the traced state at `timestamp` (in units of [`precision`]).
    ///
    /// [`precision`]: TraceRecorder::precision
    fn record(&mut self, timestamp: u64) -> Result<(), SimError>;

    /// Flushes any buffered output.
    fn finalize(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Output stream of a [`VcdRecorder`].
///
/// [`finish`](TraceSink::finish) runs once when the recorder is finalized and
/// must leave the output complete. Plain writers just flush.
pub trait TraceSink: Write {
    /// Completes the stream.
    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl TraceSink for Vec<u8> {}

impl TraceSink for File {}

impl<W: Write> TraceSink for BufWriter<W> {}

/// A trace file opened by [`open_vcd`].
pub enum TraceFile {
    /// Uncompressed VCD text.
    Plain(BufWriter<File>),
    /// Gzip-compressed VCD text.
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for TraceFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TraceFile::Plain(w) => w.write(buf),
            TraceFile::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TraceFile::Plain(w) => w.flush(),
            TraceFile::Gz(w) => w.flush(),
        }
    }
}

impl TraceSink for TraceFile {
    /// Writes the gzip trailer, then flushes the file.
    fn finish(&mut self) -> io::Result<()> {
        match self {
            TraceFile::Plain(w) => w.flush(),
            TraceFile::Gz(w) => {
                w.try_finish()?;
                w.get_mut().flush()
            }
        }
    }
}

/// Returns the VCD timescale string for `precision`.
///
/// VCD only allows 1, 10 or 100 of a unit from seconds down to
/// femtoseconds.
pub fn timescale(precision: TimeValue) -> Result<String, SimError> {
    const UNITS: [(&str, f64); 6] = [
        ("s", 1.0),
        ("ms", 1e3),
        ("us", 1e6),
        ("ns", 1e9),
        ("ps", 1e12),
        ("fs", 1e15),
    ];
    let seconds = precision.seconds();
    for (suffix, per_second) in UNITS {
        let value = seconds * per_second;
        for magnitude in [1u32, 10, 100] {
            let m = f64::from(magnitude);
            if (value - m).abs() < m * 1e-9 {
                return Ok(format!("{magnitude}{suffix}"));
            }
        }
    }
    Err(SimError::InvalidTimescale { precision })
}

struct TracedProbe {
    scope: String,
    id_code: String,
    probe: Box<dyn Probe>,
    last: Option<u64>,
}

/// VCD recorder sampling a fixed set of probes.
///
/// Probes must all be added before the first record. The first record
/// writes the header and a `$dumpvars` block with every value; later records
/// write a timestamp line followed by the changed values, or nothing at all
/// if nothing changed.
pub struct VcdRecorder<W: Write> {
    writer: W,
    precision: TimeValue,
    timescale: String,
    probes: Vec<TracedProbe>,
    started: bool,
}

impl<W: Write> VcdRecorder<W> {
    /// Creates a recorder writing to `writer` with one timestamp unit per
    /// `precision`.
    pub fn new(writer: W, precision: TimeValue) -> Result<Self, SimError> {
        let timescale = timescale(precision)?;
        Ok(Self {
            writer,
            precision,
            timescale,
            probes: Vec::new(),
            started: false,
        })
    }

    /// Adds a probe under `scope`.
    pub fn add_probe(
        &mut self,
        scope: &str,
        probe: impl Probe + 'static,
    ) -> Result<(), SimError> {
        if self.started {
            return Err(SimError::ProbeAfterStart {
                name: probe.name().to_string(),
            });
        }
        let id_code = make_id_code(self.probes.len() as u32);
        self.probes.push(TracedProbe {
            scope: scope.to_string(),
            id_code,
            probe: Box::new(probe),
            last: None,
        });
        Ok(())
    }

    /// Number of probes.
    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self) -> Result<(), SimError> {
        writeln!(self.writer, "$date")?;
        writeln!(self.writer, "  Simulation date")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  Tempo simulator")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale")?;
        writeln!(self.writer, "  {}", self.timescale)?;
        writeln!(self.writer, "$end")?;

        let mut scopes: Vec<&str> = Vec::new();
        for p in &self.probes {
            if !scopes.contains(&p.scope.as_str()) {
                scopes.push(&p.scope);
            }
        }
        for scope in scopes {
            writeln!(self.writer, "$scope module {scope} $end")?;
            for p in self.probes.iter().filter(|p| p.scope == scope) {
                writeln!(
                    self.writer,
                    "$var wire {} {} {} $end",
                    p.probe.width(),
                    p.id_code,
                    p.probe.name()
                )?;
            }
            writeln!(self.writer, "$upscope $end")?;
        }
        writeln!(self.writer, "$enddefinitions $end")?;
        Ok(())
    }

    fn write_value(writer: &mut W, probe: &TracedProbe, bits: u64) -> Result<(), SimError> {
        let width = probe.probe.width();
        let value = format_value(bits, width);
        if width == 1 {
            writeln!(writer, "{value}{}", probe.id_code)?;
        } else {
            writeln!(writer, "{value} {}", probe.id_code)?;
        }
        Ok(())
    }
}

impl<W: TraceSink> TraceRecorder for VcdRecorder<W> {
    fn precision(&self) -> TimeValue {
        self.precision
    }

    fn record(&mut self, timestamp: u64) -> Result<(), SimError> {
        if !self.started {
            self.write_header()?;
            self.started = true;
            writeln!(self.writer, "#{timestamp}")?;
            writeln!(self.writer, "$dumpvars")?;
            for probe in &mut self.probes {
                let bits = probe.probe.bits();
                Self::write_value(&mut self.writer, probe, bits)?;
                probe.last = Some(bits);
            }
            writeln!(self.writer, "$end")?;
            return Ok(());
        }

        let mut stamped = false;
        for probe in &mut self.probes {
            let bits = probe.probe.bits();
            if probe.last == Some(bits) {
                continue;
            }
            if !stamped {
                writeln!(self.writer, "#{timestamp}")?;
                stamped = true;
            }
            Self::write_value(&mut self.writer, probe, bits)?;
            probe.last = Some(bits);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SimError> {
        if !self.started {
            self.write_header()?;
            self.started = true;
        }
        self.writer.finish()?;
        Ok(())
    }
}

/// Opens a VCD file, gzip-compressed when the path ends in `.gz`.
pub fn open_vcd(path: &Path, precision: TimeValue) -> Result<VcdRecorder<TraceFile>, SimError> {
    let file = BufWriter::new(File::create(path)?);
    let writer = if path.extension().is_some_and(|ext| ext == "gz") {
        TraceFile::Gz(GzEncoder::new(file, Compression::default()))
    } else {
        TraceFile::Plain(file)
    };
    tracing::debug!(path = %path.display(), "opened trace file");
    VcdRecorder::new(writer, precision)
}

/// Generates a VCD identifier code from a sequential index.
///
/// Uses printable ASCII characters starting from `!` (0x21).
/// Multi-character codes are generated for indices >= 94.
fn make_id_code(index: u32) -> String {
    let mut result = String::new();
    let mut idx = index;
    loop {
        let c = (b'!' + (idx % 94) as u8) as char;
        result.push(c);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    result
}

fn format_value(bits: u64, width: u32) -> String {
    if width == 1 {
        return if bits & 1 == 1 { "1" } else { "0" }.to_string();
    }
    let mut s = String::with_capacity(width as usize + 1);
    s.push('b');
    for i in (0..width).rev() {
        s.push(if (bits >> i) & 1 == 1 { '1' } else { '0' });
    }
    s
}
