use busrs::services::connman::Service;
use busrs::types::constants::connman;
use busrs::{Result, Session, SessionConfig};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    let Some(name) = std::env::args().nth(1) else {
        eprintln!("usage: connman_connect <service name>");
        std::process::exit(2);
    };

    let (mut session, mut events) = Session::connect(SessionConfig::connman()).await?;
    session.init();

    let (done_tx, mut done_rx) = oneshot::channel();
    let mut done_tx = Some(done_tx);

    loop {
        tokio::select! {
            result = &mut done_rx => {
                match result {
                    Ok(Ok(_)) => println!("connected to {name}"),
                    Ok(Err(e)) => println!("connecting to {name} failed: {e}"),
                    Err(_) => println!("service disappeared"),
                }
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                session.dispatch(event);
            }
        }

        if done_tx.is_none() {
            continue;
        }
        let target = session
            .elements()
            .filter(|el| el.interface() == connman::SERVICE_INTERFACE)
            .find(|el| el.property_as::<String>("Name").is_ok_and(|n| n == name))
            .map(|el| el.path().to_string());
        let Some(path) = target else { continue };

        let service = Service::get(&session, &path)?;
        println!(
            "{name} is {} ({}%)",
            service.state(&session)?,
            service.strength(&session).unwrap_or(0)
        );
        if let Some(tx) = done_tx.take() {
            service.connect(
                &mut session,
                Some(Box::new(move |result| {
                    let _ = tx.send(result);
                })),
            )?;
        }
    }

    session.shutdown();
    Ok(())
}
