use ::time::OffsetDateTime;
use ::time::format_description::well_known::Rfc3339;

use super::prelude::*;

pub struct Time;

#[async_trait]
impl Plugin for Time {
    fn new() -> Time {
        Time
    }

    fn name() -> Name {
        Name("aika")
    }

    fn author() -> Author {
        Author("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn aliases() -> &'static [&'static str] {
        &["time"]
    }

    fn usage() -> &'static str {
        "!aika - shows the current time"
    }

    async fn execute(
        &self,
        _command: &ParsedCommand,
        _context: &CommandContext,
    ) -> Result<CommandResponse, Error> {
        // The local offset is unavailable in multithreaded processes on some platforms.
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(&Rfc3339)
            .map_err(|err| Error::Service(Box::new(err)))?;

        Ok(CommandResponse::reply(formatted))
    }
}
