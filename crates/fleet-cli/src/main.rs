//! Sign a command payload and print (or publish) the sealed envelope.
//!
//! Publishing shells out to `mosquitto_pub`, so the tool itself never links
//! a broker client. Without `--publish` it prints the topic and message for
//! use with any client at hand.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;

use fleet_core::envelope::CommandEnvelope;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broker host (only used with --publish)
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port (only used with --publish)
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Command topic of the target vehicle
    #[arg(long, default_value = "lab/drone/drone-001/commands")]
    topic: String,

    /// Shared secret the fleet verifies against
    #[arg(long, default_value = "dev-secret-change-me")]
    secret: String,

    #[arg(long, value_enum)]
    cmd: Command,

    /// Target latitude (goto)
    #[arg(long)]
    lat: Option<f64>,

    /// Target longitude (goto)
    #[arg(long)]
    lon: Option<f64>,

    /// Altitude in meters (goto, takeoff)
    #[arg(long)]
    alt: Option<f64>,

    /// Publish via mosquitto_pub instead of only printing
    #[arg(long)]
    publish: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Command {
    Ping,
    Takeoff,
    Land,
    Goto,
    Rth,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut payload = json!({"cmd": command_name(args.cmd)});
    match args.cmd {
        Command::Goto => {
            let (Some(lat), Some(lon)) = (args.lat, args.lon) else {
                bail!("goto needs --lat and --lon (and optionally --alt)");
            };
            let mut cmd_args = json!({"lat": lat, "lon": lon});
            if let Some(alt) = args.alt {
                cmd_args["alt"] = json!(alt);
            }
            payload["args"] = cmd_args;
        }
        Command::Takeoff => {
            if let Some(alt) = args.alt {
                payload["args"] = json!({"alt": alt});
            }
        }
        _ => {}
    }

    let envelope = CommandEnvelope::seal(payload, &args.secret);
    let message = serde_json::to_string(&envelope)?;

    println!("topic:   {}", args.topic);
    println!("message: {}", message);

    if args.publish {
        let status = std::process::Command::new("mosquitto_pub")
            .args(["-h", &args.host])
            .args(["-p", &args.port.to_string()])
            .args(["-t", &args.topic])
            .args(["-m", &message])
            .status()
            .context("failed to run mosquitto_pub (is it installed?)")?;
        if !status.success() {
            bail!("mosquitto_pub exited with {}", status);
        }
    }

    Ok(())
}

fn command_name(cmd: Command) -> &'static str {
    match cmd {
        Command::Ping => "ping",
        Command::Takeoff => "takeoff",
        Command::Land => "land",
        Command::Goto => "goto",
        Command::Rth => "rth",
    }
}
