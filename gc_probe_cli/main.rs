use std::{cell::RefCell, rc::Rc, time::Duration};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gc_probe::{
    ChurnBuffer, CollectorTrigger, DirectCollectorTrigger, GcProbe, HeapPressure, MemoryPressure,
    NullCollectorTrigger, ProbeError, ProbeOptions, ProbeOptionsBuilder, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_PRESSURE_SIZE,
};
use gc_probe_heap::{AllocError, Heap, WeakRef};

/// How the probe gets the heap to collect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Collect synchronously through a direct trigger
    Direct,
    /// No direct trigger; memory pressure is applied to the heap between attempts
    Fallback,
}

/// Raw command line arguments.
#[derive(Parser)]
#[command(about = "Observe a weakly held object being reclaimed by the managed heap")]
pub struct Args {
    /// How collection is triggered
    #[arg(long, value_enum, default_value_t = Mode::Direct)]
    pub mode: Mode,

    /// Evaluation budget when collection cannot be triggered directly
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, allow_negative_numbers = true)]
    pub max_attempts: i64,

    /// Elements allocated in the heap per memory pressure step
    #[arg(long, default_value_t = DEFAULT_PRESSURE_SIZE, allow_negative_numbers = true)]
    pub pressure_size: i64,

    /// Suspension before every fallback attempt, in milliseconds
    #[arg(long, default_value_t = 1)]
    pub delay_ms: u64,

    /// Give up after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Number of garbage objects to allocate before probing
    #[arg(long, default_value_t = 1000)]
    pub objects: usize,

    /// Also step the collector from a separate task in fallback mode, every
    /// this many milliseconds. 0 disables the task.
    #[arg(long, default_value_t = 0)]
    pub collector_interval_ms: u64,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("heap allocation failed: {0}")]
    Alloc(AllocError),

    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<AllocError> for CliError {
    fn from(error: AllocError) -> Self {
        CliError::Alloc(error)
    }
}

/// Create probe options from command line arguments.
fn options_from_args(args: &Args) -> ProbeOptionsBuilder {
    ProbeOptionsBuilder::new()
        .max_attempts(args.max_attempts)
        .pressure_size(args.pressure_size)
        .delay(Duration::from_millis(args.delay_ms))
        .timeout(args.timeout_ms.map(Duration::from_millis))
}

pub fn print_error_message_and_exit(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

/// Fill the heap with unrooted objects and return a weak reference to one of them.
/// One rooted object is kept alive throughout.
fn allocate_garbage(heap: &RefCell<Heap>, objects: usize) -> Result<WeakRef<String>, CliError> {
    let mut heap = heap.borrow_mut();

    let kept = heap.alloc(String::from("kept"))?;
    heap.root(kept);

    let mut target = heap.alloc(String::from("target"))?;
    let weak = heap.downgrade(target);
    for i in 0..objects {
        target = heap.alloc(format!("garbage #{i}"))?;
    }
    info!(
        objects = heap.num_objects(),
        bytes = heap.bytes_allocated(),
        last = %target.as_str(),
        "allocated garbage"
    );

    Ok(weak)
}

/// Stand-in for a collector running alongside the mutator
async fn step_collector(heap: Rc<RefCell<Heap>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let mut heap = heap.borrow_mut();
        if !heap.gc_step() {
            heap.start_gc();
        }
    }
}

async fn observe<T: CollectorTrigger, P: MemoryPressure>(
    trigger: T,
    pressure: P,
    options: ProbeOptions,
    heap: &RefCell<Heap>,
    weak: &WeakRef<String>,
) -> Result<(bool, usize), CliError> {
    let mut evaluations = 0;
    let achieved = GcProbe::with_pressure(trigger, options, pressure)
        .try_to_achieve(|| {
            evaluations += 1;
            heap.borrow().is_cleared(weak)
        })
        .await?;
    Ok((achieved, evaluations))
}

async fn run(args: &Args, options: ProbeOptions) -> Result<bool, CliError> {
    let heap = Rc::new(RefCell::new(Heap::new()));
    let weak = allocate_garbage(&heap, args.objects)?;

    let (achieved, evaluations) = match args.mode {
        Mode::Direct => {
            let trigger = DirectCollectorTrigger::new(heap.clone());
            observe(trigger, ChurnBuffer::new(), options, &heap, &weak).await?
        }
        Mode::Fallback => {
            let collector = (args.collector_interval_ms > 0).then(|| {
                let interval = Duration::from_millis(args.collector_interval_ms);
                tokio::task::spawn_local(step_collector(heap.clone(), interval))
            });
            let pressure = HeapPressure::new(heap.clone());
            let result = observe(NullCollectorTrigger, pressure, options, &heap, &weak).await;
            if let Some(collector) = collector {
                collector.abort();
            }
            result?
        }
    };

    let heap = heap.borrow();
    if achieved {
        let last_cycle = heap.last_cycle();
        info!(
            evaluations,
            cycles = heap.completed_cycles(),
            live_objects = heap.num_objects(),
            objects_freed = last_cycle.objects_freed,
            bytes_freed = last_cycle.bytes_freed,
            "reclamation observed"
        );
    } else {
        warn!(
            evaluations,
            cycles = heap.completed_cycles(),
            "reclamation not observed within budget, result inconclusive"
        );
    }

    Ok(achieved)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let options = match options_from_args(&args).build() {
        Ok(options) => options,
        Err(err) => print_error_message_and_exit(&err.to_string()),
    };

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(CliError::from)
        .and_then(|runtime| {
            let local = tokio::task::LocalSet::new();
            runtime.block_on(local.run_until(run(&args, options)))
        });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => print_error_message_and_exit(&err.to_string()),
    }
}
