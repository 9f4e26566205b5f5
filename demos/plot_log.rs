//! Replay a saved telemetry log and plot the estimated attitude
//!
//! Reads a CSV written by `TelemetryLog::save`, runs it through the attitude
//! pipeline using the recorded receipt times, and draws raw accelerometer,
//! raw gyroscope and pitch/roll/yaw panels into `attitude.png`.
//!
//! Run with: `cargo run --example plot_log -- telemetry.csv`

use std::error::Error;

use cansat_groundstation::{AttitudePipeline, Orientation, TelemetryLog, TelemetryRecord};
use plotters::prelude::*;

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| String::from("telemetry.csv"));
    let log = TelemetryLog::load(&path)?;
    if log.is_empty() {
        println!("{path} holds no telemetry");
        return Ok(());
    }

    let mut pipeline = AttitudePipeline::new();
    let attitude: Vec<Orientation> = log
        .records()
        .iter()
        .map(|record| pipeline.process(&record.to_sample()).unwrap_or_default())
        .collect();

    plot(log.records(), &attitude)?;
    println!("Wrote attitude.png ({} samples)", log.len());
    Ok(())
}

fn plot(records: &[TelemetryRecord], attitude: &[Orientation]) -> Result<(), Box<dyn Error>> {
    let start = records[0].time;
    let end = records[records.len() - 1].time;
    let time_range = 0f64..(end - start).max(1e-3);
    let time = |r: &TelemetryRecord| r.time - start;

    let root = BitMapBackend::new("attitude.png", (1280, 960)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 1));

    draw_panel(
        &panels[0],
        "Accelerometer (raw)",
        time_range.clone(),
        -35000f64..35000f64,
        [
            ("X", records.iter().map(|r| (time(r), r.ax)).collect()),
            ("Y", records.iter().map(|r| (time(r), r.ay)).collect()),
            ("Z", records.iter().map(|r| (time(r), r.az)).collect()),
        ],
    )?;

    draw_panel(
        &panels[1],
        "Gyroscope (raw)",
        time_range.clone(),
        -35000f64..35000f64,
        [
            ("X", records.iter().map(|r| (time(r), r.gx)).collect()),
            ("Y", records.iter().map(|r| (time(r), r.gy)).collect()),
            ("Z", records.iter().map(|r| (time(r), r.gz)).collect()),
        ],
    )?;

    draw_panel(
        &panels[2],
        "Attitude (deg)",
        time_range,
        -180f64..180f64,
        [
            ("Pitch", records.iter().zip(attitude).map(|(r, o)| (time(r), o.pitch)).collect()),
            ("Roll", records.iter().zip(attitude).map(|(r, o)| (time(r), o.roll)).collect()),
            ("Yaw", records.iter().zip(attitude).map(|(r, o)| (time(r), o.yaw)).collect()),
        ],
    )?;

    root.present()?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    caption: &str,
    time_range: std::ops::Range<f64>,
    value_range: std::ops::Range<f64>,
    series: [(&str, Vec<(f64, f64)>); 3],
) -> Result<(), Box<dyn Error>> {
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(time_range, value_range)?;

    chart.configure_mesh().x_desc("Time (s)").draw()?;

    for ((label, points), color) in series.into_iter().zip([RED, GREEN, BLUE]) {
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], color));
    }

    chart.configure_series_labels().border_style(BLACK).draw()?;
    Ok(())
}
