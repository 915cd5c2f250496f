//! Subcommand implementations.

use anyhow::{Context, Result, bail};
use kiosk_core::{EventSink, FanoutSink, KioskConfig, MemorySink, StateContext, TracingSink};
use kiosk_dispense::{Orchestrator, ScanDisposition};
use kiosk_hardware::{AnyTriggerDevice, NetworkDevice};
use kiosk_network::{NetworkDiscovery, RelayClient, RelayClientConfig};
use kiosk_storage::{Database, SettingsRepository, SqliteSettingsRepository};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::input::InputLine;

type Kiosk = Orchestrator<AnyTriggerDevice>;

/// Relay transport picked on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Usb,

    /// A controller address, or `None` to use the stored one and then
    /// discovery.
    Network(Option<String>),
}

/// `kiosk discover`
pub async fn discover(config: &KioskConfig) -> Result<()> {
    let client = relay_client(config)?;
    let found = sweep(&client, config).await;

    if found.is_empty() {
        println!("No relay controller answered");
    } else {
        for address in &found {
            println!("{address}");
        }
    }
    Ok(())
}

/// `kiosk run`
pub async fn run(config: KioskConfig, transport: Transport) -> Result<()> {
    let session = Session::open(config).await?;
    let events = MemorySink::default();
    let mut kiosk = Kiosk::new(session.config.dispense, event_sink(&events));

    let latest = Arc::new(Mutex::new(kiosk.snapshot()));
    {
        let latest = Arc::clone(&latest);
        kiosk.subscribe(move |ctx| {
            *latest.lock().unwrap_or_else(|p| p.into_inner()) = ctx.clone();
        });
    }

    session.bind(&mut kiosk, &transport).await?;
    println!("Ready. Scan a card, or type :status, :retry, :events or :quit");

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        match line {
            InputLine::Code(code) => {
                let cycle = kiosk.handle_detection(&code, Instant::now());
                tokio::pin!(cycle);

                // Intake is closed while the cycle runs.
                let disposition = loop {
                    tokio::select! {
                        disposition = &mut cycle => break disposition,
                        Some(extra) = lines.recv() => match extra {
                            InputLine::Status => print_status(&current(&latest)),
                            other => debug!(line = ?other, "Dropped input during dispense"),
                        },
                    }
                };
                report(&code, &disposition);
            }
            InputLine::Retry => {
                kiosk.retry();
                println!("Ready");
            }
            InputLine::Status => print_status(&kiosk.snapshot()),
            InputLine::Events => {
                for event in events.snapshot() {
                    println!(
                        "{} {:<7} [{}] {}",
                        event.timestamp.format("%H:%M:%S%.3f"),
                        event.level.to_string(),
                        event.category,
                        event.message
                    );
                }
            }
            InputLine::Quit => break,
            InputLine::Unknown(command) => eprintln!("Unknown command :{command}"),
        }
    }

    kiosk.release().await;
    info!("Kiosk stopped");
    Ok(())
}

/// `kiosk trigger`
pub async fn trigger(config: KioskConfig, transport: Transport, duration_ms: Option<u64>) -> Result<()> {
    let session = Session::open(config).await?;
    let mut kiosk = Kiosk::new(session.config.dispense, Arc::new(TracingSink));

    session.bind(&mut kiosk, &transport).await?;

    let duration = duration_ms.unwrap_or(session.config.dispense.relay_ms);
    let outcome = kiosk.test_trigger(duration).await;
    kiosk.release().await;

    if !outcome.ok {
        bail!(
            "Trigger failed: {}",
            outcome.message.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    println!("Relay pulsed for {} ms", outcome.duration_ms.unwrap_or(duration));
    Ok(())
}

/// Everything a bound kiosk needs besides the orchestrator itself.
struct Session {
    config: KioskConfig,
    client: RelayClient,
    settings: Option<SqliteSettingsRepository>,
}

impl Session {
    async fn open(config: KioskConfig) -> Result<Self> {
        let client = relay_client(&config)?;

        // Without the database the kiosk still works, it just forgets the address.
        let settings = match Database::new(&config.storage.database_path).await {
            Ok(db) => Some(SqliteSettingsRepository::new(db.pool().clone())),
            Err(e) => {
                warn!(error = %e, path = %config.storage.database_path, "Settings database unavailable");
                None
            }
        };

        Ok(Self {
            config,
            client,
            settings,
        })
    }

    async fn bind(&self, kiosk: &mut Kiosk, transport: &Transport) -> Result<()> {
        match transport {
            Transport::Usb => kiosk
                .bind(self.usb_device()?)
                .await
                .context("USB relay board not available"),
            Transport::Network(Some(address)) => self.bind_network(kiosk, address).await,
            Transport::Network(None) => {
                if let Some(address) = self.stored_address().await {
                    info!(address = %address, "Trying last used relay controller");
                    match self.bind_network(kiosk, &address).await {
                        Ok(()) => return Ok(()),
                        Err(e) => warn!(error = %e, "Last used relay controller did not answer"),
                    }
                }

                let found = sweep(&self.client, &self.config).await;
                let Some(first) = found.first() else {
                    bail!("No relay controller found; pass --network <ADDR> or --usb");
                };
                if found.len() > 1 {
                    info!(candidates = ?found, "Several controllers answered, using the first");
                }
                self.bind_network(kiosk, first).await
            }
        }
    }

    async fn bind_network(&self, kiosk: &mut Kiosk, address: &str) -> Result<()> {
        let device = NetworkDevice::with_address(self.client.clone(), address)
            .with_context(|| format!("Invalid relay controller address {address:?}"))?;

        kiosk
            .bind(device.into())
            .await
            .with_context(|| format!("Relay controller at {address} not reachable"))?;

        if let Some(bound) = kiosk.snapshot().device_address {
            self.remember(&bound).await;
        }
        Ok(())
    }

    #[cfg(feature = "hardware-usb")]
    fn usb_device(&self) -> Result<AnyTriggerDevice> {
        use kiosk_hardware::{LocalBusDevice, RusbBus};

        let bus = RusbBus::new(self.config.usb.transfer_timeout())
            .context("Failed to initialise libusb")?;
        Ok(LocalBusDevice::new(Arc::new(bus), self.config.usb.clone()).into())
    }

    #[cfg(not(feature = "hardware-usb"))]
    fn usb_device(&self) -> Result<AnyTriggerDevice> {
        bail!("This build has no USB support; rebuild with the hardware-usb feature")
    }

    async fn stored_address(&self) -> Option<String> {
        let settings = self.settings.as_ref()?;
        match settings.last_network_address().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Could not read the last used address");
                None
            }
        }
    }

    async fn remember(&self, address: &str) {
        if let Some(settings) = &self.settings
            && let Err(e) = settings.save_last_network_address(address).await
        {
            warn!(error = %e, address = %address, "Could not save the relay address");
        }
    }
}

fn relay_client(config: &KioskConfig) -> Result<RelayClient> {
    RelayClient::new(RelayClientConfig::from(&config.network)).context("Failed to build HTTP client")
}

async fn sweep(client: &RelayClient, config: &KioskConfig) -> Vec<String> {
    let discovery = NetworkDiscovery::new(config.discovery.clone());
    let found = discovery
        .run_with_progress(client, |progress| {
            info!(
                settled = progress.settled,
                total = progress.total,
                found = progress.found,
                "Discovery progress"
            );
        })
        .await;

    info!(found = found.len(), "Discovery finished");
    found
}

fn event_sink(events: &MemorySink) -> Arc<dyn EventSink> {
    Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(events.clone())),
    )
}

fn spawn_stdin_reader() -> mpsc::Receiver<InputLine> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(parsed) = InputLine::parse(&line)
                        && tx.send(parsed).await.is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

fn current(latest: &Mutex<StateContext>) -> StateContext {
    latest.lock().unwrap_or_else(|p| p.into_inner()).clone()
}

fn print_status(context: &StateContext) {
    match serde_json::to_string_pretty(context) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{context:?}"),
    }
}

fn report(code: &str, disposition: &ScanDisposition) {
    match disposition {
        ScanDisposition::Ignored => println!("Not ready, ignored {code}"),
        ScanDisposition::Suppressed => debug!(code, "Repeat read suppressed"),
        ScanDisposition::Dispensed(outcome) if outcome.ok => println!("Card dispensed for {code}"),
        ScanDisposition::Dispensed(outcome) => println!(
            "Dispense failed: {}. Type :retry when the dispenser is ready",
            outcome.message.as_deref().unwrap_or("unknown error")
        ),
    }
}
