use std::collections::HashSet;

use busrs::services::bluez::{Adapter, DeviceFound};
use busrs::types::constants::bluez;
use busrs::{EventKind, EventPayload, Result, Session, SessionConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let (mut session, mut events) = Session::connect(SessionConfig::bluez()).await?;

    session.on(EventKind::ServiceUp, |ev| {
        if let EventPayload::Owner(owner) = &ev.payload {
            println!("bluetoothd is up as {owner}");
        }
    });
    session.on(EventKind::ServiceDown, |_| println!("bluetoothd went away"));
    session.on(EventKind::ElementAdded, |ev| println!("+ {}", ev.path));
    session.on(EventKind::ElementRemoved, |ev| println!("- {}", ev.path));
    session.on(EventKind::ElementUpdated, |ev| {
        if let EventPayload::Changed { key, value } = &ev.payload {
            println!("  {}: {key} = {value:?}", ev.path);
        }
    });
    session.on(EventKind::ElementSignal, |ev| {
        if let Some(found) = DeviceFound::from_event(ev) {
            println!(
                "found {} ({}) rssi {:?}",
                found.address,
                found.alias().unwrap_or_default(),
                found.rssi()
            );
        }
    });

    session.init();

    // Start discovery on every adapter once its properties are known.
    let mut discovering = HashSet::new();
    while let Some(event) = events.recv().await {
        session.dispatch(event);

        let ready: Vec<String> = session
            .elements()
            .filter(|el| el.interface() == bluez::ADAPTER_INTERFACE && el.is_synced())
            .map(|el| el.path().to_string())
            .filter(|path| !discovering.contains(path))
            .collect();
        for path in ready {
            let adapter = Adapter::get(&session, &path)?;
            println!("starting discovery on {path}");
            adapter.start_discovery(&mut session, None)?;
            discovering.insert(path);
        }
        discovering.retain(|path| session.element_get(path).is_some());
    }

    Ok(())
}
