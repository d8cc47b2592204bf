//! Discord event handler for serenity.

use engine::Admin;
use serenity::all::{Command, Context, EventHandler, GatewayIntents, Interaction, Ready};
use serenity::async_trait;

use crate::commands;

/// Handler for Discord gateway events.
pub struct Handler {
    admin: Admin,
}

impl Handler {
    pub fn new(admin: Admin) -> Self {
        Self { admin }
    }

    /// Gateway intents needed by the bot.
    ///
    /// Interactions are delivered regardless of intents, guilds are only
    /// needed to know where the bot is.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            user = ready.user.name.as_str(),
            guilds = ready.guilds.len(),
            "Discord bot ready"
        );

        match Command::set_global_commands(&ctx, commands::definitions()).await {
            Ok(registered) => {
                tracing::info!("Registered {} commands", registered.len());
            }
            Err(e) => {
                common::log_error!(e, "Failed to register commands");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                let name = command.data.name.clone();

                if let Err(e) = commands::run_command(&ctx, &self.admin, &command).await {
                    common::log_error!(e, "Command `{}` failed", name);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = commands::run_component(&ctx, &self.admin, &component).await {
                    common::log_error!(e, "Button `{}` failed", component.data.custom_id);
                }
            }
            _ => {}
        }
    }
}
