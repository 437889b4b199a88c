use futures::StreamExt;
use structopt::StructOpt;
use tokio_util::codec::FramedRead;

use coratools::{
    build,
    codec::{
        DecoderConfig,
        PakBusCodec,
    },
    input::{
        self,
        Format,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, structopt::StructOpt)]
#[structopt(about = "decode PakBus link-layer packets from stdin (default raw binary format)")]
pub struct Options {
    #[structopt(
        long,
        help = "interpret stdin as hex (can be space and/or newline separated, does not strip 0x)"
    )]
    hex: bool,

    #[structopt(long, help = "interpret stdin as base64")]
    base64: bool,

    #[structopt(long, help = "print bytes seen outside of any packet")]
    out_of_band: bool,

    #[structopt(long, help = "count repeated synch bytes as out-of-band data")]
    redundant_synch: bool,

    #[structopt(long, help = "print one JSON object per packet")]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let options = Options::from_args();

    coratools::trace::init();
    tracing::debug!(version = build::VERSION, commit = build::COMMIT_HASH, "pakbus_decode starting");

    let buf = input::read_stdin(Format::from_flags(options.hex, options.base64)?)?;

    let codec = PakBusCodec::new(DecoderConfig {
        capture_out_of_band:     options.out_of_band,
        capture_redundant_synch: options.redundant_synch,
    });

    let mut framed = FramedRead::new(&buf[..], codec);
    let mut count = 0usize;

    while let Some(packet) = framed.next().await {
        let packet = packet?;
        count += 1;

        if options.json {
            let line = serde_json::json!({
                "kind": packet.kind,
                "link_state": packet.link_state(),
                "len": packet.body.len(),
                "body": hex::encode(&packet.body),
            });

            println!("{line}");
        } else {
            println!("{packet}");
        }
    }

    tracing::info!(packets = count, input_len = buf.len(), "finished decoding");

    if options.out_of_band {
        let oob = framed.decoder_mut().decoder_mut().take_out_of_band();

        if !oob.is_empty() {
            println!("OUT OF BAND [{} bytes]: 0x{}", oob.len(), hex::encode(&oob));
        }
    }

    Ok(())
}
