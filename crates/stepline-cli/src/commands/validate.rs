use super::{read_definition, CommandOutput, Context};
use crate::cli::ValidateArgs;
use crate::error::{exit_codes, CliError, CliResult};
use crate::output::render_validation;
use tracing::debug;

/// `stepline validate <file>`
pub fn execute(ctx: &Context, args: &ValidateArgs) -> CliResult<CommandOutput> {
    let file = args.file.display().to_string();
    let text = read_definition(&args.file)?;
    let definition = stepline_dsl::parse(&text).map_err(|e| CliError::definition(&file, e))?;

    let report = stepline_dsl::validate(&definition);
    debug!(
        file = %file,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Validated"
    );

    let exit_code = if report.is_valid() {
        exit_codes::SUCCESS
    } else {
        exit_codes::INVALID_DEFINITION
    };
    Ok(CommandOutput::success(render_validation(&file, &report, ctx.format)?).with_exit_code(exit_code))
}
