use anyhow::{Context, Result};
use tracing::info;

use crate::cli::RunArgs;
use crate::commands::open_store;
use crate::config::{BackendKind, PipelineConfig, StepConfig};
use crate::pipeline::{
    ChatNoirBackend, FileCache, Orchestrator, RetrievalBackend, ScoringStep, SimpleTermsStep,
    TermCountStep, TopicSelection, TrecRunBackend, load_topics, select_topics,
};

pub fn run(args: RunArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    let run_id = args.run_id.clone().unwrap_or_else(|| config.run_name.clone());

    let topics = load_topics(&config.topics_path)
        .with_context(|| format!("failed to load topics {}", config.topics_path.display()))?;
    let selection = match (args.single_topic, args.limit_topics) {
        (Some(topic_id), _) => TopicSelection::Single(topic_id),
        (None, Some(limit)) => TopicSelection::Limit(limit),
        (None, None) => TopicSelection::All,
    };
    let topics = select_topics(topics, selection)?;

    info!(
        run_id = %run_id,
        backend = ?config.backend,
        topics = topics.len(),
        steps = config.steps.len(),
        "starting run"
    );

    let mut orchestrator = Orchestrator::new(build_backend(&config)?);
    if config.cache.enabled {
        let dir = config
            .cache
            .dir
            .clone()
            .unwrap_or_else(|| args.cache_root.join("retrieval"));
        info!(dir = %dir.display(), "retrieval cache enabled");
        orchestrator = orchestrator.with_cache(Box::new(FileCache::new(dir)));
    }
    for step in &config.steps {
        orchestrator = orchestrator.with_step(build_step(step)?);
    }

    let mut store = open_store(&args.cache_root)?;
    if args.overwrite {
        store
            .write(&run_id, &[])
            .with_context(|| format!("failed to clear run '{run_id}'"))?;
    }

    let config_json = config.to_recorded_json()?;
    let summary = orchestrator
        .run(&mut store, &run_id, &topics, &config.weights, Some(&config_json))
        .with_context(|| format!("run '{run_id}' failed"))?;

    info!(
        run_id = %summary.run_id,
        topics = summary.topics,
        documents = summary.documents,
        cache_hits = summary.cache_hits,
        scores = %summary.score_names.join(","),
        "run stored"
    );
    Ok(())
}

fn build_backend(config: &PipelineConfig) -> Result<Box<dyn RetrievalBackend>> {
    match config.backend {
        BackendKind::Chatnoir => Ok(Box::new(ChatNoirBackend::new(config.chatnoir.options())?)),
        BackendKind::TrecRun => {
            let path = config
                .trec_run
                .path
                .as_deref()
                .context("trec_run.path is required")?;
            let backend = TrecRunBackend::load(path, config.trec_run.score_name.clone())
                .with_context(|| format!("failed to load trec run {}", path.display()))?;
            Ok(Box::new(backend))
        }
    }
}

fn build_step(step: &StepConfig) -> Result<Box<dyn ScoringStep>> {
    match step {
        StepConfig::SimpleTerms { terms_path } => {
            let step = SimpleTermsStep::from_file(terms_path)
                .with_context(|| format!("failed to load terms {}", terms_path.display()))?;
            Ok(Box::new(step))
        }
        StepConfig::TermCounts {
            factor_b,
            min_term_length,
        } => Ok(Box::new(TermCountStep::new(*factor_b, *min_term_length)?)),
    }
}
