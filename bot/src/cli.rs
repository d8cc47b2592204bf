use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use common::backoff;
use common::display;
use engine::{Admin, Proposals, PushScheduler, Reconciler, Sources};

use crate::config::Config;
use crate::secrets::{self, Secrets};

const CONFIG_DIR: &str = "Beacon";
const CONFIG: &str = "config.toml";
const SECRETS: &str = "secrets.yml";
const LOG: &str = "beacon.log";

argwerk::define! {
    /// Beacon
    ///
    /// Posts Discord notifications when creators go live on Twitch, Kick and
    /// YouTube, or publish new videos and shorts.
    #[usage = "beacon"]
    struct Args {
        help: bool,
        trace: bool,
        config: Option<PathBuf>,
        secrets: Option<PathBuf>,
        log: Vec<String>,
        log_dir: Option<PathBuf>,
    }
    /// Show this help.
    ["--help" | "-h"] => {
        println!("{}", HELP);
        help = true;
    }
    /// If we should enable tracing in all logs.
    ["--trace"] => {
        trace = true;
    }
    /// Configuration file to use.
    ["--config", #[os] path] => {
        config = Some(PathBuf::from(path));
    }
    /// Secrets file to use.
    ["--secrets", #[os] path] => {
        secrets = Some(PathBuf::from(path));
    }
    /// Additionally enable logging for the specified modules. Example: --log beacon_engine=trace
    ["--log", spec] => {
        log.push(spec);
    }
    /// Also write logs to a daily rotated file in the given directory.
    ["--log-dir", #[os] path] => {
        log_dir = Some(PathBuf::from(path));
    }
}

/// Configure logging.
fn setup_logs(
    log_dir: Option<&Path>,
    trace: bool,
    modules: &[String],
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, Registry};

    // Crates to enable logging for, by default.
    const CRATES: [&str; 7] = [
        "beacon",
        "beacon_api",
        "beacon_common",
        "beacon_db",
        "beacon_discord",
        "beacon_engine",
        "beacon_web",
    ];

    let level = if trace { "trace" } else { "info" };

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();

    for name in CRATES {
        env_filter = env_filter.add_directive(format!("{name}={level}").parse()?);
    }

    for module in modules {
        env_filter = env_filter.add_directive(module.parse()?);
    }

    let (file, guard) = match log_dir {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::Layer::default()
                .with_writer(non_blocking)
                .with_ansi(false);

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(file)
        .with(fmt::Layer::default().with_writer(std::io::stdout));

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

/// Entrypoint.
pub fn main() -> Result<()> {
    let args = Args::args()?;

    if args.help {
        return Ok(());
    }

    let _guard = setup_logs(args.log_dir.as_deref(), args.trace, &args.log)
        .context("failed to setup logs")?;

    let config_path = match args.config {
        Some(config) => config,
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("no standard configuration directory available"))?
            .join(CONFIG_DIR)
            .join(CONFIG),
    };

    let root = match config_path.parent() {
        Some(root) if !root.as_os_str().is_empty() => root.to_owned(),
        _ => std::env::current_dir().context("process to have a current directory")?,
    };

    tracing::info!("Loading config: {}", config_path.display());
    let config = Config::load(&config_path)?;

    let secrets_path = match (args.secrets, &config.secrets) {
        (Some(path), _) => path,
        (None, Some(path)) => path.to_path(&root),
        (None, None) => root.join(SECRETS),
    };

    let secrets = Secrets::open(&secrets_path)
        .with_context(|| anyhow!("failed to load secrets: {}", secrets_path.display()))?;

    let discord = secrets.load::<secrets::Discord>("discord")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut error_backoff = backoff::Exponential::new(Duration::from_secs(5));

    loop {
        let future = try_main(&root, &config, &secrets, &discord);

        let Err(e) = runtime.block_on(future) else {
            break;
        };

        common::log_error!(e, "Bot crashed");

        let backoff = error_backoff.next();
        tracing::info!("Restarting in {}...", display::compact_duration(backoff));

        let shutdown = runtime.block_on(async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => true,
                _ = tokio::time::sleep(backoff) => false,
            }
        });

        if shutdown {
            break;
        }
    }

    tracing::info!("Exiting...");
    Ok(())
}

/// Actual main function, running until shut down or until something fails.
async fn try_main(
    root: &Path,
    config: &Config,
    secrets: &Secrets,
    discord: &secrets::Discord,
) -> Result<()> {
    tracing::info!("Starting Beacon Version {}", env!("CARGO_PKG_VERSION"));

    let state_dir = config.state_dir.to_path(root);

    if !state_dir.is_dir() {
        tracing::info!("Creating state directory: {}", state_dir.display());
        tokio::fs::create_dir_all(&state_dir)
            .await
            .with_context(|| anyhow!("failed to create: {}", state_dir.display()))?;
    }

    let database_path = config.database.to_path(root);

    let db = db::Database::open(&database_path)
        .with_context(|| anyhow!("failed to open database at: {}", database_path.display()))?;

    let client = api::client()?;

    let mut sources = Sources::new();
    let mut twitch_secret = None;
    let mut kick_token = None;

    if let Some(twitch) = &config.twitch {
        let secret = secrets.load::<secrets::Twitch>("twitch")?;

        let token = api::Twitch::token_manager(
            client.clone(),
            twitch.client_id.clone(),
            secret.client_secret,
            Some(state_dir.join("twitch-token.json")),
        )?;

        let eventsub = match (twitch.eventsub, config.web.endpoint("twitch/callback")?) {
            (false, _) => None,
            (true, Some(callback)) => match &secret.eventsub_secret {
                Some(secret) => Some(api::twitch::EventSubConfig {
                    callback,
                    secret: secret.clone(),
                }),
                None => {
                    tracing::warn!("EventSub requires `twitch.eventsub_secret`, polling only");
                    None
                }
            },
            (true, None) => {
                tracing::warn!("EventSub requires `web.public_url`, polling only");
                None
            }
        };

        twitch_secret = secret.eventsub_secret;
        sources = sources.with_live(Arc::new(api::Twitch::new(client.clone(), token, eventsub)?));
    }

    if let Some(kick) = &config.kick {
        let secret = secrets.load::<secrets::Kick>("kick")?;

        let token = api::Kick::token_manager(
            client.clone(),
            kick.client_id.clone(),
            secret.client_secret,
            Some(state_dir.join("kick-token.json")),
        )?;

        if kick.webhooks && secret.webhook_token.is_none() {
            tracing::warn!("Kick webhooks require `kick.webhook_token`, callbacks are disabled");
        }

        kick_token = secret.webhook_token;
        sources = sources.with_live(Arc::new(api::Kick::new(client.clone(), token, kick.webhooks)?));
    }

    if let Some(youtube) = config.youtube.as_ref().filter(|y| y.enabled) {
        let secret = secrets.load::<secrets::YouTube>("youtube")?;
        let youtube = api::YouTube::new(client.clone(), &secret.api_key)?;

        sources = sources
            .with_live(Arc::new(youtube.clone()))
            .with_feed(Arc::new(api::YouTubeFeed::latest(youtube.clone())))
            .with_feed(Arc::new(api::YouTubeFeed::shorts(youtube)));
    }

    let platforms = sources.platforms();

    if platforms.is_empty() {
        tracing::warn!("No platforms are configured");
    } else {
        for platform in platforms {
            tracing::info!("Enabled platform: {}", platform);
        }
    }

    let sink = discord::SerenitySink::from_token(&discord.token);
    let guilds = Arc::new(discord::SerenityGuilds::new(sink.http()));
    let reconciler = Reconciler::new(Arc::new(db), Arc::new(sink), sources);
    let admin = Admin::new(reconciler.clone(), Proposals::new(config.proposals.ttl()));
    let push = PushScheduler::new(reconciler.clone(), config.sweep.push_delay());

    let api_key = secrets.get::<secrets::Web>("web")?.unwrap_or_default().api_key;

    if api_key.is_none() {
        tracing::warn!("No `web.api_key` configured, the administration API is disabled");
    }

    let web = web::Web::new(admin.clone(), push)
        .with_api_key(api_key)
        .with_twitch_secret(twitch_secret)
        .with_kick_token(kick_token)
        .with_guilds(guilds);

    let server = web::setup(config.web.addr(), web)?;
    let mut client = discord::client(&discord.token, admin).await?;

    tokio::select! {
        result = engine::sweep::run(reconciler, config.sweep.interval()) => {
            result?;
            bail!("sweep loop ended unexpectedly");
        }
        _ = server => {
            bail!("web server ended unexpectedly");
        }
        result = client.start() => {
            result?;
            bail!("discord client ended unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
