use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use cmsisdap::{DapVersion, HidApiBackend, ProbeInfo, Session, SessionConfig};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

/// The DAP_Info command.
const DAP_INFO: u8 = 0x00;

const INFO_VENDOR: u8 = 0x01;
const INFO_PRODUCT: u8 = 0x02;
const INFO_SERIAL: u8 = 0x03;
const INFO_FIRMWARE: u8 = 0x04;
const INFO_PACKET_COUNT: u8 = 0xfe;
const INFO_PACKET_SIZE: u8 = 0xff;

#[derive(StructOpt)]
#[structopt(name = "cli", about = "Get info about the connected CMSIS-DAP probes")]
enum Cli {
    /// List all connected CMSIS-DAP probes
    List {
        /// The maximum number of probes to list
        #[structopt(short, long, default_value = "16")]
        max: usize,
    },
    /// Gets infos about the selected probe
    Info {
        /// The number associated with the probe to use
        #[structopt(short = "n", long, default_value = "0")]
        index: usize,
        /// Select the probe by serial number instead
        #[structopt(short, long)]
        serial: Option<String>,
        /// Give up on a response after this many milliseconds
        #[structopt(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Serialize)]
struct InfoRequest {
    command: u8,
    id: u8,
}

#[derive(Deserialize)]
struct PacketSize {
    len: u8,
    size: u16,
}

#[derive(Deserialize)]
struct PacketCount {
    len: u8,
    count: u8,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Cli::from_args() {
        Cli::List { max } => list_connected_devices(max),
        Cli::Info {
            index,
            serial,
            timeout_ms,
        } => show_info_of_device(index, serial, timeout_ms.map(Duration::from_millis)),
    }
}

fn list_connected_devices(max: usize) -> anyhow::Result<()> {
    let backend = HidApiBackend::new()?;
    let probes = cmsisdap::enumerate(&backend, max);
    if probes.is_empty() {
        println!("No CMSIS-DAP probes found");
        return Ok(());
    }

    println!("The following devices were found:");
    for (num, probe) in probes.iter().enumerate() {
        let known = if probe.is_known_identity() { "" } else { " (unknown VID:PID)" };
        println!("[{}]: {}{}", num, probe, known);
    }
    Ok(())
}

fn select(
    probes: Vec<ProbeInfo>,
    index: usize,
    serial: Option<String>,
) -> anyhow::Result<ProbeInfo> {
    match serial {
        Some(serial) => probes
            .into_iter()
            .find(|probe| probe.serial == serial)
            .ok_or_else(|| anyhow!("no probe with serial number {}", serial)),
        None => probes
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow!("no probe with number {}", index)),
    }
}

fn show_info_of_device(
    index: usize,
    serial: Option<String>,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let backend = HidApiBackend::new()?;
    let probe = select(cmsisdap::enumerate(&backend, 256), index, serial)?;

    let mut config = SessionConfig::new(DapVersion::V1);
    config.timeout = timeout;
    let mut session = Session::open_with(&backend, &probe, config)?;

    println!("{}", probe);
    println!("report size: {}", session.report_size());

    let mut response = vec![0u8; session.report_size()];
    for (name, id) in &[
        ("vendor", INFO_VENDOR),
        ("product", INFO_PRODUCT),
        ("serial", INFO_SERIAL),
        ("firmware", INFO_FIRMWARE),
    ] {
        let len = info(&mut session, *id, &mut response)?;
        println!("{}: {}", name, info_string(&response[..len]));
    }

    let len = info(&mut session, INFO_PACKET_SIZE, &mut response)?;
    let (packet_size, _): (PacketSize, usize) =
        ssmarshal::deserialize(&response[..len]).map_err(|e| anyhow!("{:?}", e))?;
    if packet_size.len != 2 {
        bail!("unexpected packet size length {}", packet_size.len);
    }
    println!("packet size: {}", packet_size.size);

    let len = info(&mut session, INFO_PACKET_COUNT, &mut response)?;
    let (packet_count, _): (PacketCount, usize) =
        ssmarshal::deserialize(&response[..len]).map_err(|e| anyhow!("{:?}", e))?;
    if packet_count.len != 1 {
        bail!("unexpected packet count length {}", packet_count.len);
    }
    println!("packet count: {}", packet_count.count);

    session.close();
    Ok(())
}

/// Issues a DAP_Info query, returning the number of response bytes received.
fn info<H: cmsisdap::ProbeHandle>(
    session: &mut Session<H>,
    id: u8,
    response: &mut [u8],
) -> anyhow::Result<usize> {
    let mut request = [0u8; 2];
    let size = ssmarshal::serialize(&mut request, &InfoRequest { command: DAP_INFO, id })
        .map_err(|e| anyhow!("{:?}", e))?;
    let len = session
        .send(&request[..size], response)
        .with_context(|| format!("DAP_Info {:#04x}", id))?;
    Ok(len.min(response.len()))
}

/// Decodes a DAP_Info string reply: a length byte and the NUL terminated
/// string.
fn info_string(reply: &[u8]) -> String {
    let len = reply.first().map_or(0, |&len| len as usize);
    let data = reply.get(1..).unwrap_or(&[]);
    let data = &data[..len.min(data.len())];
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
