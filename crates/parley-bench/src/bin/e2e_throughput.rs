//! End-to-end throughput benchmark for Parley.
//!
//! Connects N WebSocket clients to a running server. Every client joins and
//! then sends chat frames as fast as it can while counting the chat events
//! it receives back.
//!
//! Usage: `e2e_throughput [clients] [url]`

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, ClientFrame, ServerFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:4000/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let url = args.get(2).cloned().unwrap_or_else(|| SERVER_URL.to_string());

    println!("Parley end-to-end throughput benchmark");
    println!("Make sure the server is running: cargo run --release --bin parley");
    println!();

    run_chat_benchmark(num_clients, url).await;
}

async fn run_chat_benchmark(num_clients: usize, url: String) {
    println!("Chat benchmark: {} clients against {}", num_clients, url);
    println!("Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let sent = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let handles: Vec<_> = (0..num_clients)
        .map(|client_id| {
            spawn_client(
                client_id,
                url.clone(),
                Counters {
                    received: Arc::clone(&received),
                    sent: Arc::clone(&sent),
                    failed: Arc::clone(&failed),
                },
                Arc::clone(&barrier),
            )
        })
        .collect();

    // Wait for all clients to join
    barrier.wait().await;
    let failures = failed.load(Ordering::SeqCst);
    if failures as usize == num_clients {
        eprintln!("No client could connect to {}", url);
        return;
    }
    println!("{} of {} clients joined", num_clients - failures as usize, num_clients);

    println!("Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    sent.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let total_received = received.load(Ordering::SeqCst);
    let total_sent = sent.load(Ordering::SeqCst);

    println!();
    println!("Results");
    println!("  Clients:         {:>12}", num_clients);
    println!("  Duration:        {:>12.2}s", elapsed);
    println!("  Sent:            {:>12}", total_sent);
    println!("  Delivered:       {:>12}", total_received);
    println!("  Publish rate:    {:>12.0} msg/s", total_sent as f64 / elapsed);
    println!("  Delivery rate:   {:>12.0} msg/s", total_received as f64 / elapsed);
    println!(
        "  Per client:      {:>12.0} msg/s",
        total_received as f64 / elapsed / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
struct Counters {
    received: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

/// Connect and join, then wait at `barrier` whether or not that worked, so
/// one failed client cannot stall the others.
fn spawn_client(
    client_id: usize,
    url: String,
    counters: Counters,
    barrier: Arc<Barrier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let user = format!("bench-{}", client_id);
        let connected = connect_and_join(&url, &user).await;
        barrier.wait().await;

        let result = match connected {
            Ok(ws) => run_client(ws, user, counters).await,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        };
        if let Err(e) = result {
            eprintln!("Client {} error: {}", client_id, e);
        }
    })
}

async fn connect_and_join(url: &str, user: &str) -> Result<WsStream, BoxError> {
    let (mut ws, _) = connect_async(url).await?;
    let join = codec::encode_client(&ClientFrame::join(user))?;
    ws.send(Message::Text(join)).await?;
    Ok(ws)
}

async fn run_client(ws: WsStream, user: String, counters: Counters) -> Result<(), BoxError> {
    let (mut sender, mut receiver) = ws.split();

    let received = counters.received;
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                if let Ok(ServerFrame::Chat(_)) = codec::decode_server(&text) {
                    received.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    let chat = codec::encode_client(&ClientFrame::chat(user, 0, "x".repeat(64)))?;
    let chat = Message::Text(chat);

    loop {
        if sender.send(chat.clone()).await.is_err() {
            break;
        }
        counters.sent.fetch_add(1, Ordering::Relaxed);
        // Small yield to not starve the receiver task
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
