use apdulink_frame::PacketConfig;
use apdulink_session::{Admin, SessionConfig};
use tracing::{info, warn};

use crate::cmd::{open_registry, parse_apdu, parse_hex_u16, parse_timeout, Backend, ExchangeArgs};
use crate::exit::{frame_error, session_error, CliResult, SUCCESS};
use crate::output::{print_exchange, OutputFormat};

pub fn run(args: ExchangeArgs, backend: Backend, format: OutputFormat) -> CliResult<i32> {
    let command = parse_apdu(&args.apdu)?;
    let packet = PacketConfig {
        channel: parse_hex_u16("channel", &args.channel)?,
        packet_size: args.packet_size,
    };
    packet
        .validate()
        .map_err(|err| frame_error("invalid packet settings", err))?;

    let config = SessionConfig {
        packet,
        exchange_timeout: parse_timeout(&args.timeout)?,
        reassembly: args.reassembly.into(),
        ..SessionConfig::default()
    };

    let registry = open_registry(backend, packet)?;
    let admin = Admin::new(registry.as_ref())
        .with_filter(args.filter.to_filter()?)
        .with_session_config(config);
    let session = admin
        .connect(args.index)
        .map_err(|err| session_error("connect failed", err))?;
    if let Some(device) = session.descriptor() {
        info!(index = args.index, %device, "connected");
    }

    let result = session.exchange(&command);
    if let Err(err) = session.close() {
        warn!(%err, "closing device failed");
    }
    let response = result.map_err(|err| session_error("exchange failed", err))?;

    print_exchange(&command, &response, format);
    Ok(SUCCESS)
}
