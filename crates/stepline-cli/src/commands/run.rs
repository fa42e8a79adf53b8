use super::{overrides, read_definition, CommandOutput, Context};
use crate::cli::RunArgs;
use crate::client::HttpStepService;
use crate::error::{report_exit_code, CliError, CliResult};
use crate::output::{format_issue, render_batch, render_report, NamedReport};
use std::sync::Arc;
use stepline_core::{
    run_source, BatchJob, BatchRunner, Executor, ExecutorConfig, FileSessionStore, SessionContext,
    SessionState, StepService,
};
use stepline_dsl::{compile_source, Overrides};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// `stepline run <file>...` against the configured HTTP service.
pub async fn execute(ctx: &Context, args: &RunArgs, cancel: CancellationToken) -> CliResult<CommandOutput> {
    let call_timeout = args.call_timeout.unwrap_or_else(|| ctx.config.call_timeout());
    let service = HttpStepService::new(ctx.config.base_url()?, &ctx.config.api, call_timeout)?;
    info!(endpoint = %service.endpoint(), "Using step service");
    execute_with(ctx, args, Arc::new(service), cancel).await
}

/// Runs against any step service.
pub async fn execute_with(
    ctx: &Context,
    args: &RunArgs,
    service: Arc<dyn StepService>,
    cancel: CancellationToken,
) -> CliResult<CommandOutput> {
    let config = ExecutorConfig {
        call_timeout: args.call_timeout.unwrap_or_else(|| ctx.config.call_timeout()),
        run_timeout: args.timeout.or_else(|| ctx.config.run_timeout()),
        retry: ctx.config.execution.retry.clone(),
    };
    let executor = Executor::new(service, config).with_cancellation(cancel);
    let overrides = overrides(&args.vars);

    match args.files.as_slice() {
        [file] => {
            if args.checkpoints.len() > 1 {
                return Err(CliError::Usage(format!(
                    "{} checkpoints given for a single file",
                    args.checkpoints.len()
                )));
            }
            run_single(ctx, args, &executor, file.display().to_string(), &overrides).await
        }
        files => run_batch(ctx, args, &executor, files, &overrides).await,
    }
}

/// Picks the session for a single-file run.
///
/// An explicit checkpoint (flag, then `STEPLINE_CHECKPOINT_ID`) or an
/// explicit position runs detached; otherwise the stored session is used
/// and advanced.
async fn open_session(ctx: &Context, args: &RunArgs) -> CliResult<SessionContext> {
    let explicit = args.checkpoints.first().copied().or(ctx.config.checkpoint_override);
    if let Some(checkpoint_id) = explicit {
        return Ok(SessionContext::detached(SessionState::new(
            checkpoint_id,
            args.position.unwrap_or(1),
        )));
    }

    let store = Arc::new(FileSessionStore::new(ctx.config.session_path()?));
    let session = SessionContext::resume(store).await?;
    Ok(match args.position {
        Some(position) => {
            let checkpoint_id = session.state().checkpoint_id;
            SessionContext::detached(SessionState::new(checkpoint_id, position))
        }
        None => session,
    })
}

async fn run_single(
    ctx: &Context,
    args: &RunArgs,
    executor: &Executor,
    file: String,
    overrides: &Overrides,
) -> CliResult<CommandOutput> {
    let path = &args.files[0];
    let text = read_definition(path)?;
    let mut session = open_session(ctx, args).await?;

    let run = run_source(executor, &text, overrides, &mut session)
        .await
        .map_err(|e| CliError::definition(&file, e))?;

    let notes = run.warnings.iter().map(format_issue).collect();
    Ok(CommandOutput::success(render_report(&run.report, ctx.format)?)
        .with_notes(notes)
        .with_exit_code(report_exit_code(&run.report)))
}

async fn run_batch(
    ctx: &Context,
    args: &RunArgs,
    executor: &Executor,
    files: &[std::path::PathBuf],
    overrides: &Overrides,
) -> CliResult<CommandOutput> {
    if args.checkpoints.len() != files.len() {
        return Err(CliError::Usage(format!(
            "batch mode needs one --checkpoint per file ({} files, {} checkpoints)",
            files.len(),
            args.checkpoints.len()
        )));
    }

    // Compile everything first so a bad file stops the batch before any call.
    let mut jobs = Vec::with_capacity(files.len());
    let mut notes = Vec::new();
    for (path, checkpoint_id) in files.iter().zip(&args.checkpoints) {
        let name = path.display().to_string();
        let text = read_definition(path)?;
        let compiled = compile_source(&text, overrides).map_err(|e| CliError::definition(&name, e))?;
        notes.extend(
            compiled
                .warnings
                .iter()
                .map(|w| format!("{}: {}", name, format_issue(w))),
        );
        jobs.push(BatchJob {
            name,
            operations: compiled.operations,
            session: SessionContext::detached(SessionState::new(
                *checkpoint_id,
                args.position.unwrap_or(1),
            )),
        });
    }

    let workers = args
        .parallel
        .map(|n| n as usize)
        .unwrap_or(ctx.config.execution.parallel);
    let outcomes = BatchRunner::new(executor, workers).run(jobs).await;

    let exit_code = outcomes
        .iter()
        .map(|o| report_exit_code(&o.report))
        .max()
        .unwrap_or_default();
    if exit_code != 0 {
        warn!(exit_code, "Batch finished with failures");
    }

    let named: Vec<NamedReport<'_>> = outcomes
        .iter()
        .map(|o| NamedReport {
            file: &o.name,
            report: &o.report,
        })
        .collect();
    Ok(CommandOutput::success(render_batch(&named, ctx.format)?)
        .with_notes(notes)
        .with_exit_code(exit_code))
}
