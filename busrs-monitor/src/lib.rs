use clap::{Parser, ValueEnum};
use log::{info, warn};

use busrs::{BusKind, Event, EventKind, EventPayload, Session, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Service {
    Bluez,
    Connman,
    Nm,
}

#[derive(Parser, Debug)]
#[command(name = "busrs-monitor")]
#[command(version, about = "Watch the object tree of a D-Bus service")]
struct Args {
    /// Service to follow.
    #[arg(value_enum, default_value = "bluez")]
    service: Service,

    /// Use the session bus instead of the system bus.
    #[arg(long)]
    session: bool,

    /// How many levels below the root object to follow.
    #[arg(long)]
    depth: Option<u8>,
}

impl Args {
    fn config(&self) -> SessionConfig {
        let config = match self.service {
            Service::Bluez => SessionConfig::bluez(),
            Service::Connman => SessionConfig::connman(),
            Service::Nm => SessionConfig::network_manager(),
        };
        match self.depth {
            Some(depth) => config.with_max_depth(depth),
            None => config,
        }
    }

    fn bus(&self) -> BusKind {
        if self.session {
            BusKind::Session
        } else {
            BusKind::System
        }
    }
}

fn describe(event: &Event) -> String {
    match &event.payload {
        EventPayload::None => format!("{} {}", event.kind, event.path),
        EventPayload::Owner(owner) => format!("{} {} owned by {owner}", event.kind, event.path),
        EventPayload::Snapshot(props) => {
            let mut keys: Vec<&str> = props.keys().map(|k| &**k).collect();
            keys.sort_unstable();
            format!("{} {} [{}]", event.kind, event.path, keys.join(", "))
        }
        EventPayload::Changed { key, value: Some(value) } => {
            format!("{} {} {key} = {value:?}", event.kind, event.path)
        }
        EventPayload::Changed { key, value: None } => {
            format!("{} {} {key} invalidated", event.kind, event.path)
        }
        EventPayload::Signal { member, args } => {
            format!("{} {} {member}{args:?}", event.kind, event.path)
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config();
    info!("following {} on the {} bus", config.service, args.bus());

    let (mut session, mut events) = Session::connect_to(config, args.bus()).await?;
    for kind in [
        EventKind::ServiceUp,
        EventKind::ServiceDown,
        EventKind::ElementAdded,
        EventKind::ElementRemoved,
        EventKind::ElementUpdated,
        EventKind::ElementSignal,
    ] {
        session.on(kind, |event| info!("{}", describe(event)));
    }

    session.init();
    tokio::select! {
        _ = session.run(&mut events) => warn!("transport closed"),
        result = tokio::signal::ctrl_c() => result?,
    }
    session.shutdown();
    Ok(())
}
