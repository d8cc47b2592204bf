//! Discord side of the bot: the notification sink and the administration
//! commands.

mod commands;
mod guilds;
pub use self::guilds::SerenityGuilds;
mod handler;
pub use self::handler::Handler;
mod sink;
pub use self::sink::SerenitySink;

use anyhow::Result;
use engine::Admin;
use serenity::Client;

/// Build a gateway client which serves the administration commands.
pub async fn client(token: &str, admin: Admin) -> Result<Client> {
    let client = Client::builder(token, Handler::intents())
        .event_handler(Handler::new(admin))
        .await?;

    Ok(client)
}
