use std::path::PathBuf;

use structopt::StructOpt;
use tap::Pipe;

use coratools::{
    build,
    tob::{
        LgrDate,
        TobFileReader,
        Value,
    },
    util,
};

#[derive(Debug, Clone, PartialEq, Eq, structopt::StructOpt)]
#[structopt(about = "print the header and records of a TOB1/TOB2/TOB3 data file")]
pub struct Options {
    #[structopt(parse(from_os_str))]
    path: PathBuf,

    #[structopt(long, help = "print the record index (number, time, file offset) instead of records")]
    index: bool,

    #[structopt(long, help = "print one JSON object per record")]
    json: bool,

    #[structopt(long, help = "skip the header summary")]
    no_header: bool,
}

#[derive(serde::Serialize)]
struct RecordLine<'a> {
    record_no:         Option<u32>,
    stamp:             LgrDate,
    values:            &'a [Value],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    file_mark_after:   bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    remove_mark_after: bool,
}

fn main() -> eyre::Result<()> {
    let options = Options::from_args();

    coratools::trace::init();
    tracing::debug!(build = %build::describe(), "tobdump starting");

    let reader = TobFileReader::open(&options.path)?;

    if !options.no_header {
        print_header(&reader);
    }

    if options.index {
        for entry in reader.index()? {
            if options.json {
                println!("{}", serde_json::to_string(&entry)?);
            } else {
                let record_no = entry.record_no.map(|n| n.to_string()).unwrap_or_default();
                println!("{record_no},\"{}\",{}", entry.stamp, entry.offset);
            }
        }

        return Ok(());
    }

    let file = reader.data_file();
    let mut printed = 0usize;

    for record in reader.records() {
        let values = file.decode_record(&record.data);
        util::trace_catch!(level: warn, values, record_no = ?record.record_no, "undecodable record");

        let Ok(values) = values else {
            continue;
        };

        if options.json {
            RecordLine {
                record_no: record.record_no,
                stamp: record.stamp,
                values: &values,
                file_mark_after: record.file_mark_after,
                remove_mark_after: record.remove_mark_after,
            }
            .pipe_ref(serde_json::to_string)?
            .pipe(|line| println!("{line}"));
        } else {
            let mut line = format!("\"{}\"", record.stamp);

            if let Some(record_no) = record.record_no {
                line.push_str(&format!(",{record_no}"));
            }

            for value in &values {
                line.push_str(&format!(",{value}"));
            }

            println!("{line}");
        }

        printed += 1;
    }

    tracing::info!(records = printed, path = %options.path.display(), "finished dump");

    Ok(())
}

fn print_header(reader: &TobFileReader) {
    let file = reader.data_file();
    let env = file.environment();

    println!("# {} {} ({} {}, {})", file.file_type(), env.station_name, env.model, env.serial_no, env.os_version);
    println!("# program {} sig {} created {}", env.program_name, env.program_sig, env.created);

    if !file.table_name().is_empty() {
        println!(
            "# table {} interval {}ns frame {} bytes stamp {:#06x}",
            file.table_name(),
            file.record_interval(),
            file.frame_size(),
            file.validation_stamp(),
        );
    }

    println!("# {} frame slots, {} bytes per record", reader.frame_count(), file.record_size());

    let fields = file
        .record_fields()
        .iter()
        .map(|f| format!("{} [{}] {}", f.name, f.units, f.data_type))
        .collect::<Vec<_>>();

    println!("# fields: {}", fields.join(", "));
}
