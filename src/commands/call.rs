use super::fraction::estimate_fraction;
use crate::cli::CallArgs;
use crate::errors::Error;
use crate::fraction::{default_thread_count, resolve_shards, FractionModel, FractionPolicy};
use crate::store::ObservationStore;
use crate::utils::{read_name_set, Result};
use crate::vcf::{resolve_sample, CallSetReader, PairedSites, SitePair, VcfWriter};
use crate::workflows::{analyze_pair, CallSummary, Params, SiteOutcome, FATHER, MOTHER};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{collections::HashSet, path::Path};

const CHUNK_SIZE: usize = 1024;
const PROGRESS_INTERVAL: usize = 10_000;

pub fn call(args: CallArgs) -> Result<()> {
    let num_threads = args.num_threads.unwrap_or_else(default_thread_count);
    let fraction = estimate_fraction(
        &args.store_root,
        args.shard.as_deref(),
        &args.fraction,
        num_threads,
    )?;

    let mut policy = FractionPolicy::new(args.model, fraction);
    if args.model == FractionModel::Origin {
        let fetal_reads = match &args.fetal_reads {
            Some(path) => read_name_set(path)?,
            None => {
                log::warn!("No --fetal-reads given; the origin model behaves like the lengths model");
                HashSet::new()
            }
        };
        log::info!("Loaded {} fetal read names", fetal_reads.len());
        policy = policy.with_origin(args.origin_fraction, fetal_reads);
    }
    let params = Params {
        policy,
        max_fragments: args.max_fragments,
    };
    let stores = open_stores(&args.store_root, args.shard.as_deref())?;

    let parents = CallSetReader::open(&args.parents_path, args.region.as_ref())?;
    let mut samples = vec![0; 2];
    samples[MOTHER] = resolve_sample(parents.header(), args.mother.as_deref(), MOTHER)?;
    samples[FATHER] = resolve_sample(parents.header(), args.father.as_deref(), FATHER)?;
    if samples[MOTHER] == samples[FATHER] {
        return Err("Mother and father must be different samples".to_string());
    }
    let parents = parents.with_samples(samples).with_info().with_format();

    let mut cfdna = CallSetReader::open(&args.cfdna_path, args.region.as_ref())?.with_info();
    if args.cfdna_sample.is_some() || cfdna.header().sample_count() > 0 {
        let sample = resolve_sample(cfdna.header(), args.cfdna_sample.as_deref(), 0)?;
        cfdna = cfdna.with_samples(vec![sample]).with_format();
    }
    let mut pairs = PairedSites::new(cfdna, parents);

    let output = args
        .output
        .as_deref()
        .filter(|path| *path != "-")
        .map(Path::new);
    let mut writer = VcfWriter::new(
        output,
        pairs.cfdna_header(),
        pairs.parents_header(),
        &args.sample_name,
    )?;

    log::debug!("Initializing thread pool with {} threads...", num_threads);
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("fetalcall-{}", i))
        .build()
        .map_err(|e| format!("Failed to initialize thread pool: {}", e))?;

    let mut summary = CallSummary::default();
    loop {
        let chunk = pairs
            .by_ref()
            .take(CHUNK_SIZE)
            .collect::<Result<Vec<SitePair>>>()?;
        if chunk.is_empty() {
            break;
        }
        let outcomes: Vec<SiteOutcome> = pool.install(|| {
            chunk
                .par_iter()
                .map(|pair| analyze_pair(pair, &params, &stores))
                .collect()
        });
        for (pair, outcome) in chunk.iter().zip(&outcomes) {
            writer.write(pair, outcome)?;
            summary.add(outcome);
            if summary.total() % PROGRESS_INTERVAL == 0 {
                log::info!("Processed {} records", summary.total());
            }
        }
    }

    log::info!(
        "Processed {} records: {} called, {} no-calls, {} without parental genotypes, {} without cfDNA records",
        summary.total(),
        summary.called,
        summary.no_call,
        summary.unsupported,
        summary.parental_only
    );
    Ok(())
}

fn open_stores(root: &Path, shard: Option<&str>) -> Result<Vec<ObservationStore>> {
    let stores = resolve_shards(root, shard)?
        .iter()
        .map(|shard| ObservationStore::open(root, shard))
        .collect::<std::result::Result<Vec<_>, Error>>()?;
    log::info!("Reading observations from {} shard(s)", stores.len());
    Ok(stores)
}
