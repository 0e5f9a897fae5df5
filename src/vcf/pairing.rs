use super::record::{contig_rid, FieldSchema, SiteRecord};
use crate::utils::{normalize_chrom, GenomicRegion, Result};
use rust_htslib::bcf::{self, header::HeaderView, Read};
use std::{cmp::Ordering, collections::HashMap, path::Path};

enum Source {
    Stream(bcf::Reader),
    Indexed(bcf::IndexedReader),
}

/// A VCF/BCF call set read sequentially, optionally restricted to a region.
pub struct CallSetReader {
    source: Source,
    header: HeaderView,
    record: bcf::Record,
    samples: Vec<usize>,
    schema: FieldSchema,
}

impl CallSetReader {
    pub fn open(path: &Path, region: Option<&GenomicRegion>) -> Result<Self> {
        let source = match region {
            None => Source::Stream(
                bcf::Reader::from_path(path)
                    .map_err(|e| format!("Failed to open VCF {}: {}", path.display(), e))?,
            ),
            Some(region) => {
                let mut reader = bcf::IndexedReader::from_path(path).map_err(|e| {
                    format!("Failed to open indexed VCF {}: {}", path.display(), e)
                })?;
                fetch_region(&mut reader, region, path)?;
                Source::Indexed(reader)
            }
        };
        let (header, record) = match &source {
            Source::Stream(reader) => (reader.header().clone(), reader.empty_record()),
            Source::Indexed(reader) => (reader.header().clone(), reader.empty_record()),
        };
        Ok(CallSetReader {
            source,
            header,
            record,
            samples: Vec::new(),
            schema: FieldSchema::default(),
        })
    }

    pub fn header(&self) -> &HeaderView {
        &self.header
    }

    /// Sample genotypes to extract from each record, in order.
    pub fn with_samples(mut self, samples: Vec<usize>) -> Self {
        self.samples = samples;
        self
    }

    /// Carries every INFO field declared in the header over to extracted records.
    pub fn with_info(mut self) -> Self {
        self.schema = self.schema.with_info(&self.header);
        self
    }

    /// Carries the selected samples' FORMAT fields over to extracted records.
    pub fn with_format(mut self) -> Self {
        self.schema = self.schema.with_format(&self.header);
        self
    }

    pub fn contigs(&self) -> Vec<String> {
        (0..self.header.contig_count())
            .filter_map(|rid| self.header.rid2name(rid).ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect()
    }

    pub fn next_site(&mut self) -> Result<Option<SiteRecord>> {
        let status = match &mut self.source {
            Source::Stream(reader) => reader.read(&mut self.record),
            Source::Indexed(reader) => reader.read(&mut self.record),
        };
        match status {
            None => Ok(None),
            Some(Err(e)) => Err(format!("Failed to read VCF record: {}", e)),
            Some(Ok(())) => SiteRecord::from_record(
                &self.record,
                &self.header,
                &self.samples,
                &self.schema,
            )
            .map(Some),
        }
    }
}

fn fetch_region(
    reader: &mut bcf::IndexedReader,
    region: &GenomicRegion,
    path: &Path,
) -> Result<()> {
    let rid = contig_rid(reader.header(), &region.contig)
        .ok_or_else(|| format!("Contig {} not found in {}", region.contig, path.display()))?;
    let (start, end) = match region.span {
        Some((start, end)) => (start as u64 - 1, Some(end as u64 - 1)),
        None => (0, None),
    };
    reader
        .fetch(rid, start, end)
        .map_err(|e| format!("Failed to fetch {} from {}: {}", region, path.display(), e))
}

/// Records from both call sets sharing a locus; either side may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePair {
    pub cfdna: Option<SiteRecord>,
    pub parents: Option<SiteRecord>,
}

/// Contig ordering shared by both inputs, keyed on normalized names.
#[derive(Debug, Default)]
pub struct ContigOrder {
    ranks: HashMap<String, usize>,
}

impl ContigOrder {
    pub fn new<'a>(contig_lists: impl IntoIterator<Item = &'a [String]>) -> Self {
        let mut ranks = HashMap::new();
        for contigs in contig_lists {
            for contig in contigs {
                let next = ranks.len();
                ranks
                    .entry(normalize_chrom(contig).to_string())
                    .or_insert(next);
            }
        }
        ContigOrder { ranks }
    }

    fn key<'a>(&self, site: &'a SiteRecord) -> (usize, &'a str, u32) {
        let chrom = normalize_chrom(&site.chrom);
        let rank = self.ranks.get(chrom).copied().unwrap_or(usize::MAX);
        (rank, chrom, site.pos)
    }

    pub fn compare(&self, a: &SiteRecord, b: &SiteRecord) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

/// Walks two position-sorted call sets together, yielding one pair per
/// locus in merged order.
pub struct PairedSites {
    cfdna: CallSetReader,
    parents: CallSetReader,
    order: ContigOrder,
    next_cfdna: Option<SiteRecord>,
    next_parents: Option<SiteRecord>,
    primed: bool,
}

impl PairedSites {
    pub fn new(cfdna: CallSetReader, parents: CallSetReader) -> Self {
        let cfdna_contigs = cfdna.contigs();
        let parents_contigs = parents.contigs();
        let order = ContigOrder::new([cfdna_contigs.as_slice(), parents_contigs.as_slice()]);
        PairedSites {
            cfdna,
            parents,
            order,
            next_cfdna: None,
            next_parents: None,
            primed: false,
        }
    }

    pub fn cfdna_header(&self) -> &HeaderView {
        self.cfdna.header()
    }

    pub fn parents_header(&self) -> &HeaderView {
        self.parents.header()
    }

    fn next_pair(&mut self) -> Result<Option<SitePair>> {
        if !self.primed {
            self.next_cfdna = self.cfdna.next_site()?;
            self.next_parents = self.parents.next_site()?;
            self.primed = true;
        }

        let ordering = match (&self.next_cfdna, &self.next_parents) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(c), Some(p)) => self.order.compare(c, p),
        };

        let pair = match ordering {
            Ordering::Less => SitePair {
                cfdna: self.next_cfdna.take(),
                parents: None,
            },
            Ordering::Greater => SitePair {
                cfdna: None,
                parents: self.next_parents.take(),
            },
            Ordering::Equal => SitePair {
                cfdna: self.next_cfdna.take(),
                parents: self.next_parents.take(),
            },
        };
        if self.next_cfdna.is_none() {
            self.next_cfdna = self.cfdna.next_site()?;
        }
        if self.next_parents.is_none() {
            self.next_parents = self.parents.next_site()?;
        }
        Ok(Some(pair))
    }
}

impl Iterator for PairedSites {
    type Item = Result<SitePair>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}
