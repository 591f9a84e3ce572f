/*
[INPUT]:  GRVT_API_KEY environment variable
[OUTPUT]: Live order updates and sequence gap reports on stdout
[POS]:    Examples - stream subscriptions with reconnect
[UPDATE]: When the stream API changes
*/

use grvt_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: typed stream subscriptions
///
/// The stream client reconnects on its own and resubscribes every channel.
/// Sequence gaps are reported before the out-of-order message is delivered.
#[tokio::main]
async fn main() {
    println!("=== GRVT Stream Example ===\n");

    let api_key = match std::env::var("GRVT_API_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Set GRVT_API_KEY to run this example");
            return;
        }
    };

    let client = match GrvtClient::new(ClientConfig::new(api_key, Environment::Testnet)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create client: {e}");
            return;
        }
    };
    let stream = client.stream();
    println!("✓ Stream client for {}", stream.url());

    stream.on_gap(|channel, expected, actual| async move {
        println!("! gap on {channel}: expected {expected}, got {actual}");
        Ok(())
    });

    let subscribed = stream.subscribe("v1.order", |update: OrderUpdate| async move {
        println!(
            "order {} {:?} filled {} / remaining {}",
            update.order_id, update.status, update.filled_size, update.remaining_size
        );
        Ok(())
    });
    if let Err(e) = subscribed {
        eprintln!("Subscribe failed: {e}");
        return;
    }
    println!("✓ Subscribed to {:?}\n", stream.subscriptions());

    let runner = stream.start();
    sleep(Duration::from_secs(30)).await;

    println!("\nStats: {:?}", stream.stats());
    client.close();
    match runner.await {
        Ok(Ok(())) => println!("✓ Stream closed"),
        Ok(Err(e)) => eprintln!("Stream stopped: {e}"),
        Err(e) => eprintln!("Stream task failed: {e}"),
    }
}
