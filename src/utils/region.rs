use crate::utils::Result;
use std::fmt;

/// A whole contig or a 1-based, end-inclusive interval on it.
#[derive(Debug, PartialEq, Clone)]
pub struct GenomicRegion {
    pub contig: String,
    pub span: Option<(u32, u32)>,
}

impl GenomicRegion {
    pub fn new(contig: impl Into<String>, start: u32, end: u32) -> Result<Self> {
        if start == 0 || start > end {
            return Err(format!("Invalid region: start {} > end {}", start, end));
        }

        Ok(Self {
            contig: contig.into(),
            span: Some((start, end)),
        })
    }

    pub fn whole_contig(contig: impl Into<String>) -> Self {
        Self {
            contig: contig.into(),
            span: None,
        }
    }

    pub fn from_string(encoding: &str) -> Result<Self> {
        let error_msg = || format!("Invalid region encoding: {}", encoding);
        let elements: Vec<&str> = encoding.split(&[':', '-']).collect();

        match elements[..] {
            [contig] if !contig.is_empty() => Ok(Self::whole_contig(contig)),
            [contig, start, end] if !contig.is_empty() => {
                let start: u32 = start.parse().map_err(|_| error_msg())?;
                let end: u32 = end.parse().map_err(|_| error_msg())?;
                Self::new(contig, start, end)
            }
            _ => Err(error_msg()),
        }
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some((start, end)) => write!(f, "{}:{}-{}", self.contig, start, end),
            None => write!(f, "{}", self.contig),
        }
    }
}

/// Strips a leading `chr` so that `chr7` and `7` name the same contig.
pub fn normalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}
