//! Output formatting and logging utilities

use color_eyre::eyre::Result;
use dfhf::JkMatrices;
use nalgebra::{ComplexField, DMatrix};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        // Format as HH:MM:SS (only seconds precision)
        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => {
            if let Ok(log) = File::create(path) {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            } else {
                eprintln!("Could not create output file: {}", path);
            }
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
            info!("Output will be printed to stdout");
        }
    }
}

fn frobenius<T: ComplexField<RealField = f64>>(m: &DMatrix<T>) -> f64 {
    m.iter().map(|x| x.clone().modulus_squared()).sum::<f64>().sqrt()
}

fn hermiticity_error<T: ComplexField<RealField = f64>>(m: &DMatrix<T>) -> f64 {
    frobenius(&(m - m.adjoint()))
}

/// Print norms and Hermiticity residuals of a J/K pair to a writer
pub fn print_jk_summary<W: Write, T: ComplexField<RealField = f64>>(
    writer: &mut W,
    label: &str,
    jk: &JkMatrices<T>,
) -> Result<()> {
    writeln!(writer, "{label}:")?;
    writeln!(
        writer,
        "  |J| = {:.10}  |J - J^H| = {:.3e}",
        frobenius(&jk.vj),
        hermiticity_error(&jk.vj)
    )?;
    writeln!(
        writer,
        "  |K| = {:.10}  |K - K^H| = {:.3e}",
        frobenius(&jk.vk),
        hermiticity_error(&jk.vk)
    )?;
    Ok(())
}
