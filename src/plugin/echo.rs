use super::prelude::*;

pub struct Echo;

#[async_trait]
impl Plugin for Echo {
    fn new() -> Echo {
        Echo
    }

    fn name() -> Name {
        Name("kaiku")
    }

    fn author() -> Author {
        Author("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn aliases() -> &'static [&'static str] {
        &["echo"]
    }

    fn usage() -> &'static str {
        "!kaiku <text> - repeats the text back to you"
    }

    async fn execute(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse, Error> {
        if command.args.is_empty() {
            return Ok(CommandResponse::reply(Self::usage()));
        }

        let sender = context.sender.as_deref().unwrap_or("console");

        Ok(CommandResponse::reply(format!(
            "{sender}: {}",
            command.args_text()
        )))
    }
}
