use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct SummaryOutput;

impl SummaryOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_run(&mut stdout, result)
    }

    pub fn write_run(out: &mut dyn Write, result: &RunReport) -> io::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        writeln!(out, "{cyan}KIRA-AM summary{reset}")?;
        if let Some(ingest) = &result.ingest {
            writeln!(
                out,
                "{green}Skipped (already processed): {}{reset}",
                ingest.skipped_already
            )?;
            writeln!(out, "{green}Processed now: {}{reset}", ingest.processed_now)?;
            if ingest.failed + ingest.empty > 0 {
                writeln!(
                    out,
                    "{yellow}Not processed: {} failed, {} empty{reset}",
                    ingest.failed, ingest.empty
                )?;
            }
            writeln!(
                out,
                "{green}Biome fetched: {}  Lat/Lon fetched: {}{reset}",
                ingest.biome_filled, ingest.lat_lon_filled
            )?;
        }
        if let Some(heal) = &result.heal {
            writeln!(
                out,
                "{green}Healed rows: {} of {} checked{reset}",
                heal.updated, heal.checked
            )?;
            writeln!(
                out,
                "   lineage {}, location {}, biome {}, latlon {}",
                heal.filled.lineage, heal.filled.location, heal.filled.biome, heal.filled.latlon
            )?;
        }
        writeln!(out, "{cyan}Ledger: {}{reset}", result.output)?;
        writeln!(
            out,
            "{cyan}Filtered: {} ({} rows){reset}",
            result.filtered_output, result.filtered.kept
        )?;
        Ok(())
    }
}
