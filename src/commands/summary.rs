use gpxtrace::{GpxError, Trace, TraceStatistics, load_all};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;

pub fn summary_command(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout().lock();
    let mut failed = 0;

    for (path, result) in load_all(files) {
        match result {
            Ok(trace) => write_summary(&mut stdout, &trace)?,
            Err(e) => {
                eprintln!("Could not load {}: {e}", path.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} files could not be loaded", files.len()).into());
    }
    Ok(())
}

fn write_summary<W: Write>(out: &mut W, trace: &Trace) -> Result<(), Box<dyn Error>> {
    writeln!(out, "== {}", trace.display_name())?;

    let stats = match TraceStatistics::new(trace) {
        Ok(stats) => stats,
        Err(GpxError::EmptyTrace) => {
            writeln!(out, "Distance: -- km")?;
            writeln!(out, "Average Speed: -- m/s")?;
            writeln!(out, "Maximum Speed: -- m/s")?;
            writeln!(out, "Duration: -- hours, -- minutes, -- seconds")?;
            writeln!(out, "Logging Date: --")?;
            writeln!(out, "Logging Time: -- - --")?;
            writeln!(out)?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let (hours, minutes, seconds) = split_duration(stats.duration_seconds());
    let (lat, lon) = stats.centre();

    writeln!(out, "Distance: {:.2} km", stats.distance_meters() / 1000.0)?;
    writeln!(out, "Average Speed: {:.2} m/s", stats.average_speed())?;
    writeln!(out, "Maximum Speed: {:.2} m/s", stats.maximum_speed())?;
    writeln!(
        out,
        "Duration: {hours} hours, {minutes} minutes, {seconds} seconds"
    )?;
    writeln!(out, "Logging Date: {}", format_date(trace.start_time())?)?;
    writeln!(
        out,
        "Logging Time: {} - {}",
        format_time(trace.start_time())?,
        format_time(trace.end_time())?
    )?;
    writeln!(out, "Centre: {lat:.5}, {lon:.5}")?;
    writeln!(out)?;
    Ok(())
}

fn split_duration(total: u64) -> (u64, u64, u64) {
    (total / 3600, total % 3600 / 60, total % 60)
}

fn format_date(t: Option<OffsetDateTime>) -> Result<String, Box<dyn Error>> {
    match t {
        Some(t) => Ok(t.format(format_description!("[year]-[month]-[day]"))?),
        None => Ok("--".to_string()),
    }
}

fn format_time(t: Option<OffsetDateTime>) -> Result<String, Box<dyn Error>> {
    match t {
        Some(t) => Ok(t.format(format_description!("[hour]:[minute]:[second]"))?),
        None => Ok("--".to_string()),
    }
}
