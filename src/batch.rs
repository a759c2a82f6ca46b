//! Operation pipelines over files, one file or many in parallel.
//!
//! A pipeline is a list of steps written `name` or `name:arg,arg,...`, run
//! left to right. Each step is a registered operation, except for three
//! conversions that work on the image itself:
//!
//! | Step | Effect |
//! |---|---|
//! | `as_palette[:max_colors,dither,match_palette]` | quantise; missing values come from `[palette]` |
//! | `as_true_color` | expand to true color |
//! | `as_negative` | invert colors, keeping the color mode |
//!
//! Argument conventions:
//!
//! - An empty argument is "not given": `resize:,200` sets only the height.
//! - `@path` loads an image argument: `merge:@logo.png,right,bottom,80`.
//! - Commas separate arguments, so colors are written in hex (`#ff000080`)
//!   and matrices with semicolons (`apply_convolution:0;-1;0;-1;5;-1;0;-1;0`).
//! - `resize` steps without a fit or scale take them from `[resize]`.
//!
//! ## Parallel Processing
//!
//! [`run_batch`] processes files in parallel using [rayon](https://docs.rs/rayon).
//! A failing file does not stop the others; it is reported as a
//! [`BatchEvent::Failed`] and counted in the [`BatchSummary`].

use crate::config::WidepixConfig;
use crate::context::Context;
use crate::image::Image;
use crate::operation::{Arg, Args};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] crate::Error),
    #[error("Invalid step '{step}': {message}")]
    InvalidStep { step: String, message: String },
    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("{first} and {second} would both be written to {output}")]
    DuplicateOutput {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

// ============================================================================
// Steps and pipelines
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum StepArg {
    Omitted,
    Text(String),
    Image(PathBuf),
}

/// One parsed `name:args` step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub args: Vec<StepArg>,
}

impl FromStr for Step {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = match s.split_once(':') {
            Some((name, rest)) => (name.trim(), Some(rest)),
            None => (s.trim(), None),
        };
        if name.is_empty() {
            return Err(BatchError::InvalidStep {
                step: s.to_string(),
                message: "missing operation name".into(),
            });
        }
        let args = rest
            .map(|rest| {
                rest.split(',')
                    .map(|a| {
                        let a = a.trim();
                        if a.is_empty() {
                            StepArg::Omitted
                        } else if let Some(path) = a.strip_prefix('@') {
                            StepArg::Image(PathBuf::from(path))
                        } else {
                            StepArg::Text(a.to_string())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            name: name.to_ascii_lowercase(),
            args,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn parse<S: AsRef<str>>(steps: &[S]) -> Result<Self, BatchError> {
        let steps = steps
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<_, _>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fail early on steps naming neither an operation nor a conversion.
    pub fn check(&self, ctx: &Context) -> Result<(), BatchError> {
        for step in &self.steps {
            if !is_conversion(&step.name) && !ctx.operations().contains(&step.name) {
                return Err(crate::Error::UnknownOperation(step.name.clone()).into());
            }
        }
        Ok(())
    }

    pub fn apply(&self, ctx: &Context, image: Image, config: &WidepixConfig) -> Result<Image, BatchError> {
        self.steps
            .iter()
            .try_fold(image, |img, step| apply_step(ctx, img, step, config))
    }
}

fn is_conversion(name: &str) -> bool {
    matches!(name, "as_palette" | "as_true_color" | "as_negative")
}

fn text_at(step: &Step, index: usize) -> Option<&str> {
    match step.args.get(index) {
        Some(StepArg::Text(s)) => Some(s),
        _ => None,
    }
}

fn invalid(step: &Step, message: impl Into<String>) -> BatchError {
    BatchError::InvalidStep {
        step: step.name.clone(),
        message: message.into(),
    }
}

fn apply_step(ctx: &Context, image: Image, step: &Step, config: &WidepixConfig) -> Result<Image, BatchError> {
    match step.name.as_str() {
        "as_true_color" => return Ok(image.as_true_color()),
        "as_negative" => return Ok(image.as_negative()?),
        "as_palette" => {
            let max_colors = match text_at(step, 0) {
                Some(s) => s.parse().map_err(|_| invalid(step, format!("bad color count '{s}'")))?,
                None => config.palette.max_colors,
            };
            let flag = |i: usize, default: Option<bool>| match text_at(step, i) {
                Some(s) => parse_flag(s).map(Some).ok_or_else(|| invalid(step, format!("bad flag '{s}'"))),
                None => Ok(default),
            };
            let dither = flag(1, config.palette.dither)?;
            let match_palette = flag(2, Some(config.palette.match_palette))?.unwrap_or(false);
            return Ok(image.as_palette(max_colors, dither, match_palette));
        }
        _ => {}
    }

    // Image arguments are loaded up front so the argument list can borrow them.
    let mut loaded = Vec::new();
    for arg in &step.args {
        if let StepArg::Image(path) = arg {
            if !path.exists() {
                return Err(BatchError::SourceNotFound(path.clone()));
            }
            loaded.push(ctx.load(path.as_path(), None)?);
        }
    }
    let mut images = loaded.iter();
    let mut args: Vec<Arg<'_>> = step
        .args
        .iter()
        .map(|arg| match arg {
            StepArg::Omitted => Arg::Null,
            StepArg::Text(s) => Arg::Text(s.clone()),
            StepArg::Image(_) => images.next().map_or(Arg::Null, Arg::Image),
        })
        .collect();
    if step.name == "resize" {
        args.resize(args.len().max(4), Arg::Null);
        if text_at(step, 2).is_none() {
            args[2] = Arg::Text(config.resize.fit.to_string());
        }
        if text_at(step, 3).is_none() {
            args[3] = Arg::Text(config.resize.scale.to_string());
        }
    }
    Ok(image.apply(ctx.operations(), &step.name, &Args::from(args))?)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Files
// ============================================================================

/// Load `source`, run the pipeline and save to `output`. The output format
/// is `format` when given, else the output file's extension.
pub fn process_file(
    ctx: &Context,
    pipeline: &Pipeline,
    source: &Path,
    output: &Path,
    format: Option<&str>,
    config: &WidepixConfig,
) -> Result<(u32, u32), BatchError> {
    if !source.exists() {
        return Err(BatchError::SourceNotFound(source.to_path_buf()));
    }
    let image = ctx.load_from_file(source, None)?;
    let result = pipeline.apply(ctx, image, config)?;
    result.save_to_file(ctx.mappers(), output, format, &config.output.save_options())?;
    Ok(result.dimensions())
}

/// Where a batch writes `source`: `out_dir/<stem>.<format>`, or the source
/// file name unchanged when no format is given.
pub fn output_path(source: &Path, out_dir: &Path, format: Option<&str>) -> PathBuf {
    let name = source.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("image"));
    match format {
        Some(ext) => out_dir.join(name.with_extension(ext.to_ascii_lowercase())),
        None => out_dir.join(name),
    }
}

/// Progress events emitted during a batch for the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    Processed {
        index: usize,
        source: PathBuf,
        output: PathBuf,
        dimensions: (u32, u32),
    },
    Failed {
        index: usize,
        source: PathBuf,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} written, {} failed", self.written.len(), self.failed.len())
    }
}

pub struct BatchJob<'a> {
    pub inputs: &'a [PathBuf],
    pub out_dir: &'a Path,
    pub format: Option<&'a str>,
    pub pipeline: &'a Pipeline,
    pub config: &'a WidepixConfig,
}

/// Output path of every input. Inputs that would overwrite each other
/// (`a/x.png` and `b/x.png` both landing on `out/x.png`) are refused.
fn plan_outputs<'j>(job: &BatchJob<'j>) -> Result<Vec<(&'j PathBuf, PathBuf)>, BatchError> {
    let mut seen: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut outputs = Vec::with_capacity(job.inputs.len());
    for source in job.inputs {
        let output = output_path(source, job.out_dir, job.format);
        if let Some(first) = seen.insert(output.clone(), source) {
            return Err(BatchError::DuplicateOutput {
                output,
                first: first.clone(),
                second: source.clone(),
            });
        }
        outputs.push((source, output));
    }
    Ok(outputs)
}

/// Process every input in parallel. Events are sent as files finish, so
/// their order follows completion, not input order; `index` is 1-based in
/// input order.
pub fn run_batch(
    ctx: &Context,
    job: &BatchJob<'_>,
    events: Option<Sender<BatchEvent>>,
) -> Result<BatchSummary, BatchError> {
    job.pipeline.check(ctx)?;
    let outputs = plan_outputs(job)?;
    std::fs::create_dir_all(job.out_dir)?;
    if let Some(tx) = &events {
        tx.send(BatchEvent::Started {
            total: job.inputs.len(),
        })
        .ok();
    }

    let results: Vec<(PathBuf, Result<PathBuf, String>)> = outputs
        .into_par_iter()
        .enumerate()
        .map_with(events, |tx, (i, (source, output))| {
            let result = process_file(ctx, job.pipeline, source, &output, job.format, job.config);
            let event = match &result {
                Ok(dimensions) => {
                    info!(source = %source.display(), output = %output.display(), "processed");
                    BatchEvent::Processed {
                        index: i + 1,
                        source: source.clone(),
                        output: output.clone(),
                        dimensions: *dimensions,
                    }
                }
                Err(e) => {
                    info!(source = %source.display(), error = %e, "failed");
                    BatchEvent::Failed {
                        index: i + 1,
                        source: source.clone(),
                        error: e.to_string(),
                    }
                }
            };
            if let Some(tx) = tx {
                tx.send(event).ok();
            }
            (source.clone(), result.map(|_| output).map_err(|e| e.to_string()))
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (source, result) in results {
        match result {
            Ok(output) => summary.written.push(output),
            Err(error) => summary.failed.push((source, error)),
        }
    }
    info!(%summary, "batch complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::SaveOptions;
    use crate::raster::{ColorMode, Pixels};
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, img: &Image) -> PathBuf {
        let path = dir.join(name);
        let ctx = Context::new();
        img.save_to_file(ctx.mappers(), &path, None, &SaveOptions::default())
            .unwrap();
        path
    }

    // =========================================================================
    // Step parsing
    // =========================================================================

    #[test]
    fn parse_bare_name() {
        let step: Step = "Mirror".parse().unwrap();
        assert_eq!(step.name, "mirror");
        assert!(step.args.is_empty());
    }

    #[test]
    fn parse_args_with_omitted_and_images() {
        let step: Step = "merge:@logo.png,right, ,80".parse().unwrap();
        assert_eq!(step.name, "merge");
        assert_eq!(
            step.args,
            vec![
                StepArg::Image(PathBuf::from("logo.png")),
                StepArg::Text("right".into()),
                StepArg::Omitted,
                StepArg::Text("80".into()),
            ]
        );
    }

    #[test]
    fn parse_rejects_missing_name() {
        assert!(matches!(
            ":1,2".parse::<Step>(),
            Err(BatchError::InvalidStep { .. })
        ));
    }

    #[test]
    fn check_flags_unknown_operations() {
        let ctx = Context::new();
        let ok = Pipeline::parse(&["resize:10", "as_palette", "mirror"]).unwrap();
        assert!(ok.check(&ctx).is_ok());
        let bad = Pipeline::parse(&["sharpen"]).unwrap();
        assert!(matches!(
            bad.check(&ctx),
            Err(BatchError::Image(crate::Error::UnknownOperation(_)))
        ));
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    #[test]
    fn pipeline_runs_left_to_right() {
        let ctx = Context::new();
        let pipeline = Pipeline::parse(&["crop:0,0,50%,100%", "resize:40,20,fill"]).unwrap();
        let out = pipeline
            .apply(&ctx, gradient(40, 10), &WidepixConfig::default())
            .unwrap();
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[test]
    fn resize_uses_configured_defaults() {
        let ctx = Context::new();
        let mut config = WidepixConfig::default();
        config.resize.scale = crate::operation::resize::Scale::Down;
        let pipeline = Pipeline::parse(&["resize:200"]).unwrap();
        let out = pipeline.apply(&ctx, solid(50, 25, RED), &config).unwrap();
        // never enlarged
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn palette_step_uses_config_and_overrides() {
        let ctx = Context::new();
        let img = gradient(64, 1);
        let mut config = WidepixConfig::default();
        config.palette.max_colors = 8;
        let out = Pipeline::parse(&["as_palette"])
            .unwrap()
            .apply(&ctx, img.clone(), &config)
            .unwrap();
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        let Pixels::Indexed { palette, .. } = out.handle().pixels() else {
            panic!("expected a palette image");
        };
        assert!(palette.len() <= 8);

        let out = Pipeline::parse(&["as_palette:4,no"])
            .unwrap()
            .apply(&ctx, img, &config)
            .unwrap();
        let Pixels::Indexed { palette, .. } = out.handle().pixels() else {
            panic!("expected a palette image");
        };
        assert!(palette.len() <= 4);
    }

    #[test]
    fn image_arguments_are_loaded() {
        let tmp = TempDir::new().unwrap();
        let logo = write_png(tmp.path(), "logo.png", &solid(2, 2, RED));
        let step = format!("merge:@{},right,bottom", logo.display());
        let out = Pipeline::parse(&[step])
            .unwrap()
            .apply(&Context::new(), solid(6, 6, BLUE), &WidepixConfig::default())
            .unwrap();
        assert_eq!(out.rgba_at(5, 5), RED);
        assert_eq!(out.rgba_at(0, 0), BLUE);
    }

    #[test]
    fn missing_image_argument_is_reported() {
        let pipeline = Pipeline::parse(&["merge:@/no/such/logo.png"]).unwrap();
        let result = pipeline.apply(&Context::new(), solid(2, 2, RED), &WidepixConfig::default());
        assert!(matches!(result, Err(BatchError::SourceNotFound(_))));
    }

    // =========================================================================
    // Files and batches
    // =========================================================================

    #[test]
    fn output_path_swaps_extension() {
        let out = output_path(Path::new("in/photo.png"), Path::new("out"), Some("JPG"));
        assert_eq!(out, PathBuf::from("out/photo.jpg"));
        let same = output_path(Path::new("in/photo.png"), Path::new("out"), None);
        assert_eq!(same, PathBuf::from("out/photo.png"));
    }

    #[test]
    fn batch_processes_all_files_and_reports_failures() {
        let tmp = TempDir::new().unwrap();
        let a = write_png(tmp.path(), "a.png", &solid(8, 4, RED));
        let b = write_png(tmp.path(), "b.png", &solid(4, 8, BLUE));
        let missing = tmp.path().join("missing.png");
        let out_dir = tmp.path().join("out");

        let ctx = Context::new();
        let config = WidepixConfig::default();
        let pipeline = Pipeline::parse(&["resize:2,2,fill"]).unwrap();
        let inputs = vec![a, b, missing.clone()];
        let job = BatchJob {
            inputs: &inputs,
            out_dir: &out_dir,
            format: Some("bmp"),
            pipeline: &pipeline,
            config: &config,
        };
        let (tx, rx) = std::sync::mpsc::channel();
        let summary = run_batch(&ctx, &job, Some(tx)).unwrap();

        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, missing);
        assert!(out_dir.join("a.bmp").exists());
        assert_eq!(summary.to_string(), "2 written, 1 failed");

        let events: Vec<BatchEvent> = rx.iter().collect();
        assert_eq!(events[0], BatchEvent::Started { total: 3 });
        assert_eq!(events.len(), 4);
        let reloaded = ctx.load(out_dir.join("b.bmp").as_path(), None).unwrap();
        assert_eq!(reloaded.dimensions(), (2, 2));
    }

    #[test]
    fn batch_rejects_unknown_steps_before_writing() {
        let tmp = TempDir::new().unwrap();
        let out_dir = tmp.path().join("out");
        let config = WidepixConfig::default();
        let pipeline = Pipeline::parse(&["nope"]).unwrap();
        let inputs: Vec<PathBuf> = Vec::new();
        let job = BatchJob {
            inputs: &inputs,
            out_dir: &out_dir,
            format: None,
            pipeline: &pipeline,
            config: &config,
        };
        assert!(run_batch(&Context::new(), &job, None).is_err());
        assert!(!out_dir.exists());
    }

    #[test]
    fn batch_refuses_inputs_sharing_a_file_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("b")).unwrap();
        let first = write_png(&tmp.path().join("a"), "x.png", &solid(2, 2, RED));
        let second = write_png(&tmp.path().join("b"), "x.png", &solid(2, 2, BLUE));
        let out_dir = tmp.path().join("out");

        let config = WidepixConfig::default();
        let pipeline = Pipeline::default();
        let inputs = vec![first.clone(), second.clone()];
        let job = BatchJob {
            inputs: &inputs,
            out_dir: &out_dir,
            format: None,
            pipeline: &pipeline,
            config: &config,
        };
        let err = run_batch(&Context::new(), &job, None).unwrap_err();
        match err {
            BatchError::DuplicateOutput {
                output,
                first: a,
                second: b,
            } => {
                assert_eq!(output, out_dir.join("x.png"));
                assert_eq!((a, b), (first, second));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out_dir.exists());

        // a format change does not help: both still become x.bmp
        let job = BatchJob {
            format: Some("bmp"),
            ..job
        };
        assert!(matches!(
            run_batch(&Context::new(), &job, None),
            Err(BatchError::DuplicateOutput { .. })
        ));
    }
}
