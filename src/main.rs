use anyhow::Context;
use champion_socket::core::traits::{LOGINID_KEY, TOKEN_KEY};
use champion_socket::{
    IdentityStore, MemoryIdentityStore, MessageKind, MessageKindSets, Request, SocketBuilder,
    SocketConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Reads CHAMPION_* variables, from .env when present
    let config = SocketConfig::from_env_file("CHAMPION").context("loading socket config")?;

    let identity = Arc::new(MemoryIdentityStore::new());
    let kinds = match std::env::var("CHAMPION_TOKEN") {
        Ok(token) => {
            identity.set(TOKEN_KEY, &token);
            if let Ok(loginid) = std::env::var("CHAMPION_LOGINID") {
                identity.set(LOGINID_KEY, &loginid);
            }
            MessageKindSets::default()
        }
        // No authorize without a token, so only website_status gates readiness
        Err(_) => MessageKindSets::anonymous(),
    };

    let (client, mut unsolicited) = SocketBuilder::new(config)
        .with_identity_store(identity)
        .with_kind_sets(kinds)
        .build()?;
    println!("Connecting to {}", client.socket_url());

    let status = client
        .request(Request::new(MessageKind::WebsiteStatus, 1))?
        .await?;
    match status.payload() {
        Some(payload) => println!("website_status: {}", payload),
        None => println!("website_status returned no payload: {:?}", status.error),
    }

    match tokio::time::timeout(Duration::from_secs(15), client.ready()).await {
        Ok(Ok(())) => println!("Session ready"),
        Ok(Err(e)) => println!("Session handshake failed: {}", e),
        Err(_) => println!("Session not ready after 15s"),
    }

    while let Ok(Some(message)) =
        tokio::time::timeout(Duration::from_millis(500), unsolicited.recv()).await
    {
        println!("Unsolicited {}", message.msg_type);
    }

    client.shutdown()?;
    Ok(())
}
