use clap::{Parser, Subcommand};
use iec62056_rs::iec::registers::REGISTERS;
use iec62056_rs::{
    init_logger, log_info, Drs110m, MeterDevice, MeterSession, Pafal, Password, SessionConfig,
};

#[derive(Parser)]
#[command(name = "iec62056-cli")]
#[command(about = "CLI tool for IEC 62056-21 meter readout")]
struct Cli {
    /// Serial port device to use
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a DRS110M meter's registers in programming mode
    ReadoutDrs110m {
        /// Meter id to address
        #[arg(short, long, default_value_t = 1613300153)]
        meter_id: u64,
        /// Programming mode password
        #[arg(long, default_value_t = 0)]
        password: u32,
        /// Register names to read; defaults to the whole table
        #[arg(short, long)]
        registers: Vec<String>,
    },
    /// Capture a PAFAL meter's OBIS readout via the mode C baud switch
    ReadoutPafal {
        /// Meter id to address; broadcast when omitted
        #[arg(short, long)]
        meter_id: Option<u64>,
    },
    /// Request a single OBIS value after the mode C wake-up
    ReadObis {
        #[arg(short, long, default_value = "1.8.0")]
        code: String,
    },
    /// List the built-in register table
    Registers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::ReadoutDrs110m {
            meter_id,
            password,
            registers,
        } => {
            let session = MeterSession::connect_with_config(
                &cli.port,
                &Drs110m::serial_config(),
                SessionConfig::default(),
            )?;
            let mut device: Box<dyn MeterDevice> = if registers.is_empty() {
                Box::new(Drs110m::new(session, meter_id, Password::new(password)))
            } else {
                let names: Vec<&str> = registers.iter().map(String::as_str).collect();
                Box::new(Drs110m::with_registers(
                    session,
                    meter_id,
                    Password::new(password),
                    &names,
                )?)
            };
            let report = device.poll().await?;
            log_info(&format!("{} readout complete", device.name()));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ReadoutPafal { meter_id } => {
            let session = MeterSession::connect_with_config(
                &cli.port,
                &Pafal::serial_config(),
                SessionConfig::default(),
            )?;
            let mut device: Box<dyn MeterDevice> = Box::new(Pafal::new(session, meter_id));
            let report = device.poll().await?;
            log_info(&format!("{} readout complete", device.name()));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ReadObis { code } => {
            let session = MeterSession::connect_with_config(
                &cli.port,
                &Pafal::serial_config(),
                SessionConfig::default(),
            )?;
            let mut device = Pafal::new(session, None);
            device.start_communication().await?;
            let records = device.request_value(&code).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Registers => {
            for def in REGISTERS {
                println!("{:>6}  {:<14}  {}", format!("{:#x}", def.address), def.name, def.unit);
            }
        }
    }

    Ok(())
}
