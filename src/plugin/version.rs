use super::prelude::*;

pub struct BotVersion;

#[async_trait]
impl Plugin for BotVersion {
    fn new() -> BotVersion {
        BotVersion
    }

    fn name() -> Name {
        Name("version")
    }

    fn author() -> Author {
        Author("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version(env!("CARGO_PKG_VERSION"))
    }

    fn usage() -> &'static str {
        "!version - shows the bot version"
    }

    async fn execute(
        &self,
        _command: &ParsedCommand,
        _context: &CommandContext,
    ) -> Result<CommandResponse, Error> {
        Ok(CommandResponse::reply(format!(
            "{} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )))
    }
}
