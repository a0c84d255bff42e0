use gpxtrace::{AverageSpeedSeries, GpxError, TraceStatistics, WeeklyDistance, load_all};
use std::error::Error;
use std::path::PathBuf;

pub fn weekly_command(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut weekly = WeeklyDistance::new();
    let mut speeds = AverageSpeedSeries::new();

    for (path, result) in load_all(files) {
        let trace = match result {
            Ok(trace) => trace,
            Err(e) => {
                eprintln!("Could not load {}: {e}", path.display());
                continue;
            }
        };

        match TraceStatistics::new(&trace) {
            Ok(stats) => {
                weekly.add_trace(&stats);
                speeds.add_trace(&stats);
            }
            Err(GpxError::EmptyTrace) => {
                tracing::warn!(path = %path.display(), "no track points, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if speeds.is_empty() {
        return Err("no usable traces".into());
    }

    println!("Total Distance Per Week");
    for (label, km) in weekly.bars() {
        println!("{label}\t{km:.2} km");
    }
    println!();
    println!("Average Speed");
    for (index, speed) in speeds.points() {
        println!("{index}\t{speed:.2} m/s");
    }

    Ok(())
}
