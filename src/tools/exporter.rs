//! CSV export of stamped frame sequences.
//!
//! One row per frame. The header names the columns:
//!
//! ```text
//! Time,1:sensor1[0],2:emg left[0],2:emg left[1]
//! 0,0.25,-1.5,3
//! ```
//!
//! Every sensor column is `id:label[channel]`, so [`load_csv`] can rebuild the frames.
//! The header follows the layout of the first exported frame; later frames must carry
//! the same sensors.

use crate::data::{Frame, Range, Sample, SensorId, Sequence, StampedFrame, Value};
use crate::error::{AppResult, DaqError};
use crate::experiment::Processor;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const TIME_COLUMN: &str = "Time";

/// Column name of one channel of a sensor.
pub fn column_name(id: SensorId, label: &str, channel: usize) -> String {
    format!("{}:{}[{}]", id, label, channel)
}

/// Header row for frames shaped like `frame`.
pub fn header(frame: &Frame) -> Vec<String> {
    let mut columns = vec![TIME_COLUMN.to_string()];
    for entry in frame {
        for channel in 0..entry.sample.len() {
            columns.push(column_name(entry.sample.id(), &entry.label, channel));
        }
    }
    columns
}

/// CSV writer of stamped frames, usable as an iterative [`Processor`].
///
/// [`Exporter::write_frame`] writes every frame it is given. As a processor it keeps
/// track of the source positions already written, so overlapping windows export each
/// frame once; discarding from the front of the source while exporting shifts those
/// positions. In consume mode every processed window is erased from its source after
/// it is written; pair it with [`Advance::Consume`](crate::experiment::Advance::Consume).
#[derive(Debug)]
pub struct Exporter<W: Write> {
    writer: csv::Writer<W>,
    columns: Option<usize>,
    written: usize,
    consume: bool,
    rows: usize,
}

impl Exporter<File> {
    /// Exporter writing to a new file at `path`.
    pub fn create(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Exporting to CSV");
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> Exporter<W> {
    /// Exporter writing to `writer`.
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            columns: None,
            written: 0,
            consume: false,
            rows: 0,
        }
    }

    /// Erase every processed window from its source.
    pub fn consuming(mut self) -> Self {
        self.consume = true;
        self
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write one frame, emitting the header first if needed.
    pub fn write_frame(&mut self, frame: &StampedFrame) -> AppResult<()> {
        let columns = match self.columns {
            Some(columns) => columns,
            None => {
                let header = header(&frame.value);
                self.writer.write_record(&header)?;
                self.columns = Some(header.len());
                header.len()
            }
        };
        let mut record = Vec::with_capacity(columns);
        record.push(frame.timestamp.to_string());
        record.extend(frame.value.iter().flat_map(|e| e.sample.iter().map(Value::to_string)));
        if record.len() != columns {
            return Err(DaqError::Layout(format!(
                "frame at t={} has {} columns, header has {}",
                frame.timestamp,
                record.len(),
                columns
            )));
        }
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// Write every frame of `sequence`.
    pub fn write_sequence(&mut self, sequence: &Sequence) -> AppResult<()> {
        for frame in sequence {
            self.write_frame(frame)?;
        }
        self.flush()
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&mut self) -> AppResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> AppResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| DaqError::Io(e.into_error()))
    }
}

impl<W: Write + Send + 'static> Processor for Exporter<W> {
    fn process(&mut self, range: &Range) -> AppResult<()> {
        range.read(|window| -> AppResult<()> {
            let skip = if self.consume {
                0
            } else {
                self.written.saturating_sub(window.start())
            };
            for frame in window.iter().skip(skip) {
                self.write_frame(frame)?;
            }
            if !self.consume {
                self.written = self.written.max(window.start() + window.len());
            }
            Ok(())
        })?;
        if self.consume {
            // Taken after the read lock is released.
            range.erase();
        }
        Ok(())
    }

    fn end(&mut self, _range: &Range) -> AppResult<()> {
        tracing::debug!(rows = self.rows, "CSV export finished");
        self.flush()
    }
}

/// Write `sequence` to a new CSV file at `path`.
pub fn save_csv(sequence: &Sequence, path: impl AsRef<Path>) -> AppResult<()> {
    Exporter::create(path)?.write_sequence(sequence)
}

/// Read a CSV file written by [`Exporter`] back into a sequence.
pub fn load_csv(path: impl AsRef<Path>) -> AppResult<Sequence> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = parse_header(reader.headers()?)?;
    let mut sequence = Sequence::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let timestamp = parse_number::<f64>(fields.next())?;
        let mut frame = Frame::new();
        let mut values = Vec::new();
        for (i, column) in columns.iter().enumerate() {
            values.push(parse_number::<Value>(fields.next())?);
            let closes = columns
                .get(i + 1)
                .map_or(true, |next| next.id != column.id || next.channel == 0);
            if closes {
                let sample = Sample::new(column.id, std::mem::take(&mut values));
                frame.push(column.label.clone(), sample);
            }
        }
        sequence.append_frame(timestamp, frame, false, false)?;
    }
    Ok(sequence)
}

#[derive(Debug)]
struct Column {
    id: SensorId,
    label: String,
    channel: usize,
}

fn parse_header(header: &csv::StringRecord) -> AppResult<Vec<Column>> {
    let mut fields = header.iter();
    if fields.next() != Some(TIME_COLUMN) {
        return Err(DaqError::Layout(format!(
            "CSV header must start with '{}'",
            TIME_COLUMN
        )));
    }
    fields.map(parse_column).collect()
}

fn parse_column(name: &str) -> AppResult<Column> {
    let invalid = || DaqError::Layout(format!("invalid CSV column '{}'", name));
    let (id, rest) = name.split_once(':').ok_or_else(invalid)?;
    let (label, channel) = rest
        .strip_suffix(']')
        .and_then(|r| r.rsplit_once('['))
        .ok_or_else(invalid)?;
    let id = id
        .parse::<u8>()
        .ok()
        .and_then(SensorId::new)
        .ok_or_else(invalid)?;
    let channel = channel.parse().map_err(|_| invalid())?;
    Ok(Column {
        id,
        label: label.to_string(),
        channel,
    })
}

fn parse_number<T: std::str::FromStr>(field: Option<&str>) -> AppResult<T> {
    let field =
        field.ok_or_else(|| DaqError::Layout("CSV row is shorter than its header".into()))?;
    field
        .trim()
        .parse()
        .map_err(|_| DaqError::Layout(format!("invalid CSV number '{}'", field)))
}
