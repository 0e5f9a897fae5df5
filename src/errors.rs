use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {read_id} at {chrom}:{pos} not found in the alignment window")]
    Correlation {
        chrom: String,
        pos: u32,
        read_id: String,
    },
    #[error("invalid trace line {line}: {msg}")]
    MalformedTrace { line: usize, msg: String },
    #[error("invalid position marker at trace line {line}: {msg}")]
    MalformedMarker { line: usize, msg: String },
    #[error("fragment recorded while no position is open")]
    NoOpenPosition,
    #[error("duplicate fragment {read_id} at {chrom}:{pos}")]
    DuplicateFragment {
        chrom: String,
        pos: u32,
        read_id: String,
    },
    #[error("fragment {read_id} at {chrom}:{pos} has lengths {first} and {second}")]
    InconsistentLength {
        chrom: String,
        pos: u32,
        read_id: String,
        first: u32,
        second: u32,
    },
    #[error("no fragment lengths available for fetal fraction estimation")]
    InsufficientData,
    #[error("no usable fragments at {chrom}:{pos}")]
    NoEvidence { chrom: String, pos: u32 },
    #[error("trace order violated: {msg}")]
    Sequence { msg: String },
    #[error("alignment access failed: {msg}")]
    Alignment { msg: String },
    #[error("call set access failed: {msg}")]
    CallSet { msg: String },
    #[error("observation store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt observation batch {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Errors that invalidate the whole build pass rather than one fragment or position.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Sequence { .. }
                | Error::Alignment { .. }
                | Error::CallSet { .. }
                | Error::Io { .. }
                | Error::Serialization { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sequence(msg: impl Into<String>) -> Self {
        Error::Sequence { msg: msg.into() }
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
