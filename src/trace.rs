//! Line-oriented trace-file reader for the CLI driver.
//!
//! Format, one record per line (`#` starts a comment):
//!
//! ```text
//! info <executable> <pid> <sample-rate> <word-size>
//! alloc <nsamples> <common-prefix> <loc> <loc> ...
//! ```
//!
//! `alloc` carries the backtrace extension beyond the prefix shared with the
//! previous record, as hex location codes; the producer has already
//! validated the shared prefix. Unknown directives (promote, collect, ...)
//! are skipped.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Stream metadata from the `info` record.
#[derive(Clone, Debug)]
pub struct TraceInfo {
    /// Name of the profiled executable.
    pub executable: String,
    /// Process id of the profiled run.
    pub pid: u64,
    /// Fraction of words sampled (0, 1].
    pub sample_rate: f64,
    /// Word size in bytes on the profiled system.
    pub word_size: u64,
}

/// One sampled allocation.
#[derive(Clone, Debug)]
pub struct AllocRecord {
    /// Sampled words attributed to this allocation.
    pub nsamples: u64,
    /// Leading backtrace symbols shared with the previous record.
    pub common_prefix: usize,
    /// Backtrace beyond the common prefix, outermost frame first.
    pub extension: Vec<u64>,
}

/// A parsed trace line.
#[derive(Clone, Debug)]
pub enum TraceEvent {
    /// Stream metadata; at most one per trace, before any allocation.
    Info(TraceInfo),
    /// A sampled allocation.
    Alloc(AllocRecord),
}

/// Reader failure: I/O, or a malformed line with its number.
#[derive(Debug)]
pub enum TraceError {
    /// Underlying I/O failure.
    Io(io::Error),
    /// Malformed record.
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(e) => write!(f, "trace read failed: {e}"),
            TraceError::Parse { line, message } => {
                write!(f, "trace line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for TraceError {}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> Self {
        TraceError::Io(e)
    }
}

/// Iterator over the events of a trace stream.
pub struct TraceReader<R> {
    input: R,
    line: usize,
    buf: String,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        Ok(TraceReader::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> TraceReader<R> {
    /// Read a trace from any buffered source.
    pub fn new(input: R) -> Self {
        TraceReader {
            input,
            line: 0,
            buf: String::new(),
        }
    }

    fn parse(&self, fields: &[&str]) -> Result<Option<TraceEvent>, TraceError> {
        let err = |message: String| TraceError::Parse {
            line: self.line,
            message,
        };
        match fields[0] {
            "info" => {
                if fields.len() != 5 {
                    return Err(err(format!(
                        "info expects 4 fields, got {}",
                        fields.len() - 1
                    )));
                }
                let pid = fields[2]
                    .parse()
                    .map_err(|_| err(format!("bad pid {:?}", fields[2])))?;
                let sample_rate: f64 = fields[3]
                    .parse()
                    .map_err(|_| err(format!("bad sample rate {:?}", fields[3])))?;
                if !(sample_rate > 0.0 && sample_rate <= 1.0) {
                    return Err(err(format!("sample rate {sample_rate} out of (0, 1]")));
                }
                let word_size = fields[4]
                    .parse()
                    .map_err(|_| err(format!("bad word size {:?}", fields[4])))?;
                Ok(Some(TraceEvent::Info(TraceInfo {
                    executable: fields[1].to_string(),
                    pid,
                    sample_rate,
                    word_size,
                })))
            }
            "alloc" => {
                if fields.len() < 3 {
                    return Err(err("alloc expects at least 2 fields".to_string()));
                }
                let nsamples = fields[1]
                    .parse()
                    .map_err(|_| err(format!("bad sample count {:?}", fields[1])))?;
                let common_prefix = fields[2]
                    .parse()
                    .map_err(|_| err(format!("bad common prefix {:?}", fields[2])))?;
                let mut extension = Vec::with_capacity(fields.len() - 3);
                for loc in &fields[3..] {
                    let code = u64::from_str_radix(loc.trim_start_matches("0x"), 16)
                        .map_err(|_| err(format!("bad location code {loc:?}")))?;
                    extension.push(code);
                }
                Ok(Some(TraceEvent::Alloc(AllocRecord {
                    nsamples,
                    common_prefix,
                    extension,
                })))
            }
            // promote / collect and anything newer: not our concern.
            _ => Ok(None),
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.input.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            match self.parse(&fields) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(text: &str) -> Result<Vec<TraceEvent>, TraceError> {
        TraceReader::new(Cursor::new(text.to_string())).collect()
    }

    #[test]
    fn parses_info_and_allocs() {
        let events = read_all(
            "# a comment\n\
             info app 4242 0.01 8\n\
             alloc 3 0 0xa 0xb 0xc\n\
             promote 7\n\
             alloc 1 2 0xd\n",
        )
        .unwrap();
        assert_eq!(events.len(), 3);
        match &events[0] {
            TraceEvent::Info(info) => {
                assert_eq!(info.executable, "app");
                assert_eq!(info.pid, 4242);
                assert_eq!(info.word_size, 8);
            }
            other => panic!("expected info, got {other:?}"),
        }
        match &events[1] {
            TraceEvent::Alloc(a) => {
                assert_eq!(a.nsamples, 3);
                assert_eq!(a.common_prefix, 0);
                assert_eq!(a.extension, vec![0xa, 0xb, 0xc]);
            }
            other => panic!("expected alloc, got {other:?}"),
        }
        match &events[2] {
            TraceEvent::Alloc(a) => {
                assert_eq!(a.common_prefix, 2);
                assert_eq!(a.extension, vec![0xd]);
            }
            other => panic!("expected alloc, got {other:?}"),
        }
    }

    #[test]
    fn reports_line_numbers_on_errors() {
        let err = read_all("info app 1 0.5 8\nalloc x 0 0xa\n").unwrap_err();
        match err {
            TraceError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_sample_rate() {
        assert!(read_all("info app 1 2.0 8\n").is_err());
        assert!(read_all("info app 1 0 8\n").is_err());
    }

    #[test]
    fn empty_backtrace_alloc_is_valid() {
        let events = read_all("alloc 1 0\n").unwrap();
        match &events[0] {
            TraceEvent::Alloc(a) => assert!(a.extension.is_empty()),
            other => panic!("expected alloc, got {other:?}"),
        }
    }
}
