use std::path::PathBuf;

use {
    anyhow::{Context, Result},
    clap::Parser,
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::warn,
};

use {
    vellum_client::{ConnectOptions, ConnectionEvent, GameClient, Outcome},
    vellum_protocol::FollowUp,
};

mod render;

/// Console front end for the Vellum adventure engine.
///
/// Connects to a running engine over WebSocket, performs the handshake,
/// and drives the story from a line-oriented prompt.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Engine endpoint; overrides the config file.
    #[arg(long)]
    url: Option<String>,

    /// Path to a config file. Defaults to the platform config dir.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-request timeout in milliseconds; overrides the config file.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = vellum_config::load(args.config.as_deref()).context("loading config")?;
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout_ms = Some(ms);
    }

    let mut options = ConnectOptions::new(config.url.clone());
    options.ui_version = config.ui_version.clone();
    options.request_timeout = config.request_timeout();
    options.strict_handshake = config.strict_handshake;

    let (game, mut events) = GameClient::connect(options)
        .await
        .with_context(|| format!("connecting to {}", config.url))?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::ProtocolError(message) => {
                    warn!(%message, "engine sent an undecodable frame");
                },
                ConnectionEvent::Closed { pending_aborted } => {
                    if pending_aborted > 0 {
                        warn!(pending_aborted, "connection closed mid-request");
                    }
                    break;
                },
            }
        }
    });

    if let Some(server) = game.server() {
        let name = server.name.as_deref().unwrap_or("unnamed story");
        let author = server.author.as_deref().unwrap_or("unknown author");
        println!("{name} by {author} (engine {})", server.engine_version);
        if let Some(description) = server.description.as_deref() {
            println!("{description}");
        }
    }

    if let Some(intro) = game.intro().await? {
        if let Some(title) = intro.title.as_deref() {
            println!("\n— {title} —");
        }
    }
    show_room(&game).await?;

    repl(&game).await?;
    game.close().await;
    Ok(())
}

async fn repl(game: &GameClient) -> Result<()> {
    println!("\nType `help` for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let rest = parts.collect::<Vec<_>>().join(" ");
        match command {
            "" => {},
            "quit" | "exit" => break,
            "help" => help(),
            "look" => show_room(game).await?,
            "inventory" | "inv" => show_inventory(game).await?,
            "locations" | "exits" => show_locations(game).await?,
            "go" => go(game, &rest).await?,
            "take" => take(game, &rest).await?,
            "use" => use_item(game, &rest).await?,
            "combine" => combine(game, &rest).await?,
            other => println!("unknown command `{other}`; try `help`"),
        }
    }
    Ok(())
}

fn help() {
    println!("  look                show the current room");
    println!("  go <room>           walk to a reachable room");
    println!("  take <thing>        pick up something mentioned in the room");
    println!("  use <item>          use an inventory item");
    println!("  combine <a> + <b>   combine two inventory items");
    println!("  inventory           list carried items");
    println!("  locations           list reachable rooms");
    println!("  quit                leave the game");
}

async fn show_room(game: &GameClient) -> Result<()> {
    let room = game.current_room().await?;
    print!("{}", render::room_block(&room));
    Ok(())
}

async fn show_inventory(game: &GameClient) -> Result<()> {
    let items = game.inventory().await?;
    if items.is_empty() {
        println!("You are carrying nothing.");
        return Ok(());
    }
    println!("You are carrying:");
    for item in &items {
        println!("{}", render::item_line(item));
    }
    Ok(())
}

async fn show_locations(game: &GameClient) -> Result<()> {
    let locations = game.locations().await?;
    if locations.is_empty() {
        println!("Nowhere to go from here.");
        return Ok(());
    }
    println!("You can go to:");
    for location in &locations {
        println!("{}", render::location_line(location));
    }
    Ok(())
}

async fn go(game: &GameClient, target: &str) -> Result<()> {
    if target.is_empty() {
        println!("go where?");
        return Ok(());
    }
    let locations = game.locations().await?;
    let Some(room_id) = locations
        .iter()
        .find(|l| l.id == target || l.name.eq_ignore_ascii_case(target))
        .map(|l| l.id.clone())
    else {
        println!("You see no way to `{target}` from here.");
        return Ok(());
    };
    match game.enter_room(&room_id).await? {
        Outcome::Accepted(room) => print!("{}", render::room_block(&room)),
        Outcome::Refused(message) => println!("{message}"),
    }
    Ok(())
}

async fn take(game: &GameClient, target: &str) -> Result<()> {
    if target.is_empty() {
        println!("take what?");
        return Ok(());
    }
    let room = game.current_room().await?;
    let Some(item_id) = room
        .description
        .items
        .values()
        .find(|i| i.id == target || i.name.eq_ignore_ascii_case(target))
        .map(|i| i.id.clone())
    else {
        println!("There is no `{target}` here.");
        return Ok(());
    };
    match game.use_description_item(&item_id).await? {
        Outcome::Accepted(outcome) => {
            if let Some(message) = outcome.message.as_deref() {
                println!("{message}");
            }
            match outcome.action {
                Some(FollowUp::AddToInventory) => show_inventory(game).await?,
                Some(FollowUp::MoveTo) => show_room(game).await?,
                _ => {},
            }
        },
        Outcome::Refused(message) => println!("{message}"),
    }
    Ok(())
}

async fn use_item(game: &GameClient, target: &str) -> Result<()> {
    if target.is_empty() {
        println!("use what?");
        return Ok(());
    }
    let Some(item_id) = find_carried(game, target).await? else {
        println!("You are not carrying `{target}`.");
        return Ok(());
    };
    match game.use_item(&item_id).await? {
        Outcome::Accepted(outcome) => {
            if let Some(message) = outcome.message.as_deref() {
                println!("{message}");
            }
            if outcome.action == Some(FollowUp::MoveTo) {
                show_room(game).await?;
            }
        },
        Outcome::Refused(message) => println!("{message}"),
    }
    Ok(())
}

async fn combine(game: &GameClient, rest: &str) -> Result<()> {
    let Some((first, second)) = rest.split_once('+') else {
        println!("combine <a> + <b>");
        return Ok(());
    };
    let (first, second) = (first.trim(), second.trim());
    let (Some(first_id), Some(second_id)) = (
        find_carried(game, first).await?,
        find_carried(game, second).await?,
    ) else {
        println!("You need to be carrying both things.");
        return Ok(());
    };
    match game.combine(&first_id, &second_id).await? {
        Outcome::Accepted(item) => println!("You now have: {}", item.name),
        Outcome::Refused(message) => println!("{message}"),
    }
    Ok(())
}

async fn find_carried(game: &GameClient, target: &str) -> Result<Option<String>> {
    let items = game.inventory().await?;
    Ok(items
        .iter()
        .find(|i| i.id == target || i.name.eq_ignore_ascii_case(target))
        .map(|i| i.id.clone()))
}
