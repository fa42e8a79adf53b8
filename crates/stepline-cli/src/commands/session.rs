use super::{CommandOutput, Context};
use crate::cli::SessionCommand;
use crate::error::CliResult;
use crate::output::render_session;
use stepline_core::{FileSessionStore, SessionState, SessionStore};
use tracing::info;

/// `stepline session show | set | clear`
pub async fn execute(ctx: &Context, command: &SessionCommand) -> CliResult<CommandOutput> {
    let store = FileSessionStore::new(ctx.config.session_path()?);

    let state = match command {
        SessionCommand::Show => store.load().await?,
        SessionCommand::Set {
            checkpoint,
            position,
        } => {
            let state = SessionState::new(*checkpoint, *position);
            store.save(&state).await?;
            info!(path = %store.path().display(), checkpoint_id = state.checkpoint_id, "Session set");
            Some(state)
        }
        SessionCommand::Clear => {
            store.clear().await?;
            info!(path = %store.path().display(), "Session cleared");
            None
        }
    };

    Ok(CommandOutput::success(render_session(state.as_ref(), ctx.format)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::output::OutputFormat;

    fn context(dir: &tempfile::TempDir) -> Context {
        let config = Config {
            session_file: Some(dir.path().join("nested").join("session.json")),
            ..Config::default()
        };
        Context::new(config, Some(OutputFormat::Human))
    }

    #[tokio::test]
    async fn set_show_clear() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let set = execute(&ctx, &SessionCommand::Set { checkpoint: 1680449, position: 3 })
            .await
            .unwrap();
        assert_eq!(set.stdout, "checkpoint 1680449 next position 3");

        let shown = execute(&ctx, &SessionCommand::Show).await.unwrap();
        assert_eq!(shown.stdout, set.stdout);

        let cleared = execute(&ctx, &SessionCommand::Clear).await.unwrap();
        assert_eq!(cleared.stdout, "no active session");
        assert_eq!(execute(&ctx, &SessionCommand::Show).await.unwrap().stdout, "no active session");
    }
}
