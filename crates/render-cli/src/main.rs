use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand};
use engine_opencl::demo::{MandelbrotKernel, IMAGE_BUFFER};
use engine_opencl::engine::{ClEngine, RenderStatus};
use engine_opencl::hardware::OpenClHardware;
use render_core::{LogSink, RenderParams};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Subcommand, Debug)]
enum Command {
    /// List every visible OpenCL platform and device
    Probe,
    /// Render the demo Mandelbrot kernel to a PPM image
    Render {
        /// Output image width in pixels
        #[arg(long, env = "RENDER_WIDTH", default_value_t = 800)]
        width: usize,

        /// Output image height in pixels
        #[arg(long, env = "RENDER_HEIGHT", default_value_t = 600)]
        height: usize,

        /// Maximum escape-time iterations per pixel
        #[arg(long = "max-iter", env = "RENDER_MAX_ITER", default_value_t = 256)]
        max_iter: u32,

        /// Memory budget for device buffers, in mebibytes
        #[arg(long = "memory-limit-mib", env = "RENDER_MEMORY_LIMIT_MIB", default_value_t = 256)]
        memory_limit_mib: usize,

        /// Target wall-clock duration of one batch, in milliseconds
        #[arg(long = "target-cycle-ms", env = "RENDER_TARGET_CYCLE_MS", default_value_t = 100)]
        target_cycle_ms: u64,

        /// Force a recompile even when source and defines are unchanged
        /// (also purges the driver's on-disk kernel cache)
        #[arg(long = "no-build-cache", env = "RENDER_NO_BUILD_CACHE")]
        no_build_cache: bool,

        /// Output file (binary PPM)
        #[arg(short, long, env = "RENDER_OUTPUT", default_value = "mandelbrot.ppm")]
        output: PathBuf,

        /// Enable verbose logging (per-batch sizing decisions)
        #[arg(short, long, env = "RENDER_VERBOSE")]
        verbose: bool,
    },
}

/// Adaptive OpenCL render engine CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Probe => run_probe(),
        Command::Render {
            width,
            height,
            max_iter,
            memory_limit_mib,
            target_cycle_ms,
            no_build_cache,
            output,
            verbose,
        } => {
            let params = RenderParams {
                width,
                height,
                memory_limit_mib,
                target_cycle_secs: target_cycle_ms as f64 / 1000.0,
                use_build_cache: !no_build_cache,
            };
            run_render(params, max_iter, &output, verbose)
        }
    }
}

fn run_probe() -> anyhow::Result<()> {
    init_logging(false);
    let devices = OpenClHardware::enumerate();
    if devices.is_empty() {
        println!("no OpenCL devices found");
        return Ok(());
    }
    for info in devices {
        println!(
            "{} / {} ({}), max alloc {} MiB",
            info.platform_name,
            info.device_name,
            info.vendor,
            info.max_mem_alloc_size / (1024 * 1024)
        );
    }
    Ok(())
}

fn run_render(
    params: RenderParams,
    max_iter: u32,
    output: &PathBuf,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(verbose);

    let hardware = Arc::new(
        OpenClHardware::new().context("no usable OpenCL device; try `clburst probe`")?,
    );
    log::info!(
        "rendering {}x{} on {} ({})",
        params.width,
        params.height,
        hardware.info().device_name,
        hardware.info().vendor
    );

    let kernel = MandelbrotKernel::new(max_iter);
    let mut engine = ClEngine::new(hardware, Box::new(kernel), Arc::new(LogSink));

    engine.build(&params)?;
    engine.create_kernel(&params)?;
    engine.create_command_queue()?;
    engine.pre_allocate_buffers(&params)?;
    engine.assign_parameters_to_kernel(&params)?;

    let cancel = AtomicBool::new(false);
    let started = Instant::now();
    match engine.render(&params, &cancel)? {
        RenderStatus::Completed { batches, elapsed } => {
            log::info!(
                "completed {} pixels in {batches} batches ({:.3}s)",
                params.pixel_count(),
                elapsed.as_secs_f64()
            );
        }
        RenderStatus::Cancelled { .. } => {
            return Err(anyhow!("render was cancelled"));
        }
    }

    let image = engine
        .buffers()
        .find(IMAGE_BUFFER)
        .ok_or_else(|| anyhow!("image buffer missing after render"))?;
    write_ppm(output, params.width, params.height, image.host())
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!(
        "wrote {} ({:.3}s total)",
        output.display(),
        started.elapsed().as_secs_f64()
    );

    #[cfg(feature = "metrics")]
    print!("{}", render_metrics::gather());

    Ok(())
}

fn init_logging(verbose: bool) {
    // If RUST_LOG is not set, default based on the verbose flag.
    if std::env::var("RUST_LOG").is_err() {
        let log_level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", log_level);
    }
    env_logger::init();
}

/// Write an RGBA host buffer as a binary PPM (P6), dropping the alpha channel.
fn write_ppm(path: &PathBuf, width: usize, height: usize, rgba: &[u8]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{width} {height}\n255\n")?;
    for px in rgba.chunks_exact(4) {
        out.write_all(&px[..3])?;
    }
    out.flush()
}
