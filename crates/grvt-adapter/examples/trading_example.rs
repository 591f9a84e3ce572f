/*
[INPUT]:  GRVT_API_KEY and GRVT_PRIVATE_KEY environment variables
[OUTPUT]: Signed order submission and cancellation results
[POS]:    Examples - order signing and trading operations
[UPDATE]: When the trading API or signed order layout changes
*/

use chrono::Utc;
use grvt_adapter::*;

const SUB_ACCOUNT_ID: u64 = 1;

/// Example: sign and submit a post-only limit order, then cancel it
///
/// Every order is EIP-712 signed locally; the private key never leaves the process.
#[tokio::main]
async fn main() {
    println!("=== GRVT Trading Example ===\n");

    let (api_key, private_key) =
        match (std::env::var("GRVT_API_KEY"), std::env::var("GRVT_PRIVATE_KEY")) {
            (Ok(api_key), Ok(private_key)) => (api_key, private_key),
            _ => {
                eprintln!("Set GRVT_API_KEY and GRVT_PRIVATE_KEY to run this example");
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
    let signer = match client.order_signer(&private_key) {
        Ok(signer) => signer,
        Err(e) => {
            eprintln!("Invalid private key: {e}");
            return;
        }
    };
    println!("✓ Signing as {}", signer.address());

    let instruments = match client
        .rest()
        .get_instruments(&InstrumentFilter::default().kind(Kind::Perpetual).base("BTC"))
        .await
    {
        Ok(instruments) => instruments,
        Err(e) => {
            eprintln!("Failed to list instruments: {e}");
            return;
        }
    };
    let Some(instrument) = instruments.first() else {
        eprintln!("No BTC perpetual listed");
        return;
    };
    println!("✓ Trading {} ({})", instrument.instrument, instrument.instrument_hash);

    let now_ns = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let order = OrderLeg::new(&instrument.instrument_hash, "0.001", "10000", true)
        .and_then(|leg| {
            let expiration = now_ns + 3_600 * 1_000_000_000;
            Order::new(
                SUB_ACCOUNT_ID,
                TimeInForce::GoodTillTime,
                expiration,
                vec![leg],
                OrderMetadata::generate(),
            )
        })
        .map(|order| order.with_post_only(true));
    let mut order = match order {
        Ok(order) => order,
        Err(e) => {
            eprintln!("Invalid order: {e}");
            return;
        }
    };
    if let Err(e) = order.sign(&signer) {
        eprintln!("Signing failed: {e}");
        return;
    }

    match client.rest().create_order(&order).await {
        Ok(ack) => {
            println!("✓ Order {} is {:?}", ack.order_id, ack.status);
            match client.rest().cancel_order(SUB_ACCOUNT_ID, &ack.order_id).await {
                Ok(_) => println!("✓ Order cancelled"),
                Err(e) => eprintln!("Cancel failed: {e}"),
            }
        }
        Err(e) => eprintln!("Order rejected: {e}"),
    }
}

