use super::{overrides, read_definition, CommandOutput, Context};
use crate::cli::CompileArgs;
use crate::error::{CliError, CliResult};
use crate::output::{format_issue, render_operations};
use stepline_dsl::compile_source;

/// `stepline compile <file> [--var NAME=VALUE]...`
pub fn execute(ctx: &Context, args: &CompileArgs) -> CliResult<CommandOutput> {
    let file = args.file.display().to_string();
    let text = read_definition(&args.file)?;
    let compiled =
        compile_source(&text, &overrides(&args.vars)).map_err(|e| CliError::definition(&file, e))?;

    let notes = compiled.warnings.iter().map(format_issue).collect();
    Ok(CommandOutput::success(render_operations(&compiled.operations, ctx.format)?).with_notes(notes))
}
