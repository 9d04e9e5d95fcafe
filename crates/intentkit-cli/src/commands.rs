//! Subcommand implementations. Each returns the text printed on stdout.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use intentkit_ai::{
    Classifier, ClassifierError, DomainHooks, FitOptions, FitOutcome, IntentHooks, Outcome,
    TrainingHooks,
};
use intentkit_core::{ConfigFields, ResourceLoader};
use intentkit_store::ProjectLoader;
use tracing::warn;

use crate::{EvaluateArgs, FitArgs, HashArgs, PredictArgs, Target, TreeArgs};

/// Run `$body` with `$clf` bound to the domain or intent classifier the
/// target selects.
macro_rules! with_classifier {
    ($target:expr, |$clf:ident| $body:expr) => {{
        let loader = project_loader($target)?;
        match &$target.domain {
            Some(domain) => {
                let $clf = Classifier::intent(loader, domain.clone());
                $body
            }
            None => {
                let $clf = Classifier::domain(loader);
                $body
            }
        }
    }};
}

fn project_loader(target: &Target) -> anyhow::Result<Arc<dyn ResourceLoader>> {
    if !target.project.is_dir() {
        bail!("project directory {} does not exist", target.project.display());
    }
    Ok(Arc::new(ProjectLoader::new(&target.project)))
}

fn read_overrides(path: Option<&Path>) -> anyhow::Result<ConfigFields> {
    let Some(path) = path else {
        return Ok(ConfigFields::default());
    };
    let json = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    ConfigFields::from_json(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn not_ready<H: TrainingHooks>() -> anyhow::Error {
    anyhow::anyhow!("{} has no fitted model", H::NAME)
}

// ── fit ──

pub fn fit(args: &FitArgs) -> anyhow::Result<String> {
    let overrides = read_overrides(args.config.as_deref())?;
    with_classifier!(&args.target, |clf| fit_with(clf, args, overrides))
}

fn fit_with<H: TrainingHooks>(
    mut clf: Classifier<H>,
    args: &FitArgs,
    overrides: ConfigFields,
) -> anyhow::Result<String> {
    let options = |previous_model_path| FitOptions {
        label_set: &args.label_set,
        previous_model_path,
        overrides: overrides.clone(),
        ..Default::default()
    };
    let outcome = match clf.fit(options((!args.force).then_some(args.model.as_path()))) {
        Err(ClassifierError::Load { path, source, .. }) => {
            warn!(path = %path.display(), error = %source, "cached model unreadable, refitting");
            clf.fit(options(None))?
        }
        other => other?,
    };

    match outcome {
        FitOutcome::SingleClass => {
            return Ok(format!("{clf}: fewer than two labels in {:?}, nothing fitted", args.label_set));
        }
        FitOutcome::CacheHit => {}
        FitOutcome::Fitted => {
            if let Outcome::NotReady = clf.dump(&args.model)? {
                return Err(not_ready::<H>());
            }
        }
    }
    let verb = if outcome == FitOutcome::CacheHit { "reused" } else { "wrote" };
    Ok(format!("{clf}: {verb} {} (hash {})", args.model.display(), clf.hash()))
}

// ── predict ──

pub fn predict(args: &PredictArgs) -> anyhow::Result<String> {
    with_classifier!(&args.target, |clf| predict_with(clf, args))
}

fn predict_with<H: TrainingHooks>(mut clf: Classifier<H>, args: &PredictArgs) -> anyhow::Result<String> {
    clf.load(&args.model)?;
    if args.proba {
        let row = clf
            .predict_proba(args.text.as_str())?
            .ready()
            .ok_or_else(not_ready::<H>)?;
        let json: serde_json::Map<String, serde_json::Value> =
            row.into_iter().map(|(label, p)| (label, p.into())).collect();
        Ok(serde_json::to_string_pretty(&json)?)
    } else {
        clf.predict(args.text.as_str())?
            .ready()
            .ok_or_else(not_ready::<H>)
    }
}

// ── evaluate ──

pub fn evaluate(args: &EvaluateArgs) -> anyhow::Result<String> {
    with_classifier!(&args.target, |clf| evaluate_with(clf, args))
}

fn evaluate_with<H: TrainingHooks>(mut clf: Classifier<H>, args: &EvaluateArgs) -> anyhow::Result<String> {
    clf.load(&args.model)?;
    let evaluation = clf
        .evaluate(None, &args.label_set)?
        .ready()
        .ok_or_else(not_ready::<H>)?;
    Ok(match evaluation {
        Some(evaluation) => evaluation.to_string(),
        None => format!("no examples in label set {:?}", args.label_set),
    })
}

// ── hash ──

pub fn hash(args: &HashArgs) -> anyhow::Result<String> {
    let overrides = read_overrides(args.config.as_deref())?;
    with_classifier!(&args.target, |clf| Ok(clf.digest(None, &args.label_set, overrides)?))
}

// ── tree ──

pub fn tree(args: &TreeArgs) -> anyhow::Result<String> {
    let loader = project_loader(&args.target)?;
    match &args.target.domain {
        Some(domain) => render_tree(&IntentHooks::new(domain.clone()), loader.as_ref(), args),
        None => render_tree(&DomainHooks, loader.as_ref(), args),
    }
}

fn render_tree<H: TrainingHooks>(
    hooks: &H,
    loader: &dyn ResourceLoader,
    args: &TreeArgs,
) -> anyhow::Result<String> {
    Ok(if args.raw {
        serde_json::to_string_pretty(&hooks.raw_query_tree(loader, None, &args.label_set)?)?
    } else {
        serde_json::to_string_pretty(&hooks.query_tree(loader, None, &args.label_set)?)?
    })
}
