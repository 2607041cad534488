//! Reads from (and optionally writes to) an EMUCOM channel of a J-Link.

use jaylink_host::{Capability, Context, ErrorKind};
use std::error::Error;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt)]
struct Opts {
    /// Serial number of the probe to connect to.
    #[structopt(long = "serial")]
    serial: Option<u32>,

    /// EMUCOM channel to use.
    #[structopt(long = "channel", short = "c", parse(try_from_str = parse_int))]
    channel: u32,

    /// Text to write to the channel before reading.
    #[structopt(long = "write", short = "w")]
    write: Option<String>,

    /// Number of bytes to read per request.
    #[structopt(long = "read-size", default_value = "64")]
    read_size: usize,

    /// USB transfer timeout in milliseconds.
    #[structopt(long = "timeout", default_value = "1000")]
    timeout: u64,
}

fn parse_int(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() {
    env_logger::init();

    let opts = Opts::from_args();
    if let Err(e) = run(opts) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> Result<(), Box<dyn Error>> {
    let context = Context::new()?.with_timeout(Duration::from_millis(opts.timeout));
    let mut handle = context.open_by_serial(opts.serial)?;
    handle.require_capability(Capability::Emucom)?;

    if let Some(text) = &opts.write {
        let mut data = text.as_bytes();
        while !data.is_empty() {
            let written = handle.emucom_write(opts.channel, data)?;
            if written == 0 {
                eprintln!("channel accepted no data, {} bytes left unwritten", data.len());
                break;
            }
            eprintln!("wrote {} bytes", written);
            data = &data[written..];
        }
    }

    let mut buf = vec![0; opts.read_size];
    loop {
        match handle.emucom_read(opts.channel, &mut buf) {
            Ok(0) => break,
            Ok(n) => println!("{:02x?}", &buf[..n]),
            Err(e) if e.kind() == ErrorKind::NotAvailable => {
                eprintln!("{}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
