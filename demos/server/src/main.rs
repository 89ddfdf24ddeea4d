//! Example Modbus slave that serves a set of devices over TCP and optionally a serial port
//!
//! Values can be changed from stdin:
//!
//! * `uc` toggles all coils
//! * `udi` toggles all discrete inputs
//! * `uhr` increments all holding registers
//! * `uir` increments all input registers
//! * `x` closes the server and exits

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use mbslave::server::*;
use mbslave::*;

#[derive(Parser)]
#[command(name = "example-server")]
#[command(about = "An example Modbus slave built on the mbslave crate")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:502", help = "The socket address to listen on")]
    address: SocketAddr,
    #[arg(
        short = 'i',
        long = "unit-id",
        default_value = "1",
        value_delimiter = ',',
        help = "Comma delimited list of the unit ids served (e.g. 1,2,3)"
    )]
    unit_ids: Vec<u8>,
    #[cfg(feature = "serial")]
    #[arg(long, help = "Optional serial port to also serve Modbus RTU on")]
    serial: Option<String>,
    #[cfg(feature = "serial")]
    #[arg(long, default_value = "9600", help = "Baud rate of the serial port")]
    baud_rate: u32,
    #[arg(long, default_value_t = ServerConfig::DEFAULT_QUEUE_CAPACITY, help = "Capacity of the request queue")]
    queue_capacity: usize,
    #[arg(long, default_value_t = ServerConfig::DEFAULT_MAX_SESSIONS, help = "Maximum number of TCP sessions")]
    max_sessions: usize,
    #[arg(long, help = "Drop queued requests on exit instead of answering them")]
    abort: bool,
    #[arg(long, value_enum, default_value = "function", help = "Decoding of requests and responses in the log")]
    decode: Decode,
}

#[derive(Copy, Clone, ValueEnum)]
enum Decode {
    Nothing,
    Function,
    Data,
    Frame,
    All,
}

impl From<Decode> for DecodeLevel {
    fn from(value: Decode) -> Self {
        match value {
            Decode::Nothing => DecodeLevel::nothing(),
            Decode::Function => PduDecodeLevel::FunctionCode.into(),
            Decode::Data => PduDecodeLevel::Data.into(),
            Decode::Frame => DecodeLevel::new(
                PduDecodeLevel::Data,
                AduDecodeLevel::Payload,
                PhysDecodeLevel::Nothing,
            ),
            Decode::All => DecodeLevel::new(
                PduDecodeLevel::Data,
                AduDecodeLevel::Payload,
                PhysDecodeLevel::Data,
            ),
        }
    }
}

impl Cli {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            queue_capacity: self.queue_capacity,
            max_sessions: self.max_sessions,
            shutdown: if self.abort {
                ShutdownPolicy::Abort
            } else {
                ShutdownPolicy::Drain
            },
            decode: self.decode.into(),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let unit_ids: Vec<UnitId> = cli.unit_ids.iter().map(|x| UnitId::new(*x)).collect();

    let mut server = Server::new(&unit_ids, cli.config());

    // a custom function code that answers with the number of requests it has seen
    for id in &unit_ids {
        let mut count: u16 = 0;
        server
            .register_handler(
                *id,
                0x41,
                handler_fn(move |_store, _request| {
                    count = count.wrapping_add(1);
                    Ok(count.to_be_bytes().to_vec())
                }),
            )
            .await?;
    }

    server.listen_tcp(cli.address).await?;

    #[cfg(feature = "serial")]
    if let Some(path) = &cli.serial {
        let settings = mbslave::serial::SerialSettings {
            baud_rate: cli.baud_rate,
            ..Default::default()
        };
        server.listen_rtu(path, settings)?;
    }

    for endpoint in server.endpoints() {
        tracing::info!("serving on {}", endpoint);
    }

    let mut reader = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = reader.next().await {
        match line?.as_str() {
            "x" => break,
            "uc" => {
                server
                    .transaction(|store| {
                        for id in store.unit_ids().collect::<Vec<_>>() {
                            if let Some(device) = store.get_mut(id) {
                                for coil in device.coils_mut() {
                                    *coil = !*coil;
                                }
                            }
                        }
                    })
                    .await?
            }
            "udi" => {
                server
                    .transaction(|store| {
                        for id in store.unit_ids().collect::<Vec<_>>() {
                            if let Some(device) = store.get_mut(id) {
                                for discrete_input in device.discrete_inputs_mut() {
                                    *discrete_input = !*discrete_input;
                                }
                            }
                        }
                    })
                    .await?
            }
            "uhr" => {
                server
                    .transaction(|store| {
                        for id in store.unit_ids().collect::<Vec<_>>() {
                            if let Some(device) = store.get_mut(id) {
                                for holding_register in device.holding_registers_mut() {
                                    *holding_register = holding_register.wrapping_add(1);
                                }
                            }
                        }
                    })
                    .await?
            }
            "uir" => {
                server
                    .transaction(|store| {
                        for id in store.unit_ids().collect::<Vec<_>>() {
                            if let Some(device) = store.get_mut(id) {
                                for input_register in device.input_registers_mut() {
                                    *input_register = input_register.wrapping_add(1);
                                }
                            }
                        }
                    })
                    .await?
            }
            _ => println!("unknown command"),
        }
    }

    server.close().await;
    Ok(())
}
