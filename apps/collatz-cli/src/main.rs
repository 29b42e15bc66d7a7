use clap::Parser;
use collatz::report::{Report, measure};
use collatz::{Aggregation, Backend, Partition, SolverConfig, create_solver};
use std::process::ExitCode;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "collatz")]
#[command(about = "Find the number below a ceiling with the longest Collatz chain")]
struct Cli {
    /// Inclusive upper bound of the numbers investigated
    #[arg(default_value_t = 1_000_000, env = "COLLATZ_CEILING")]
    ceiling: u64,

    /// Solver backend: sequential, parallel, brute-force or independent
    #[arg(short, long, default_value_t = Backend::Parallel, env = "COLLATZ_BACKEND")]
    backend: Backend,

    /// Number of worker threads for the parallel backend
    #[arg(short, long, default_value_t = collatz::solver::DEFAULT_WORKERS, env = "COLLATZ_WORKERS")]
    workers: usize,

    /// What parallel workers report back: longest or all
    #[arg(long, default_value_t = Aggregation::Longest)]
    aggregation: Aggregation,

    /// How numbers are dealt to parallel workers: round-robin or contiguous
    #[arg(long, default_value_t = Partition::RoundRobin)]
    partition: Partition,

    /// Run every backend and check that they agree
    #[arg(short, long)]
    all: bool,

    /// Log pool and worker activity
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self, backend: Backend) -> SolverConfig {
        SolverConfig {
            backend,
            workers: self.workers,
            aggregation: self.aggregation,
            partition: self.partition,
        }
    }

    fn backends(&self) -> Vec<Backend> {
        if self.all {
            Backend::ALL.to_vec()
        } else {
            vec![self.backend]
        }
    }
}

fn run(cli: &Cli) -> collatz::Result<Vec<Report>> {
    cli.backends()
        .into_iter()
        .map(|backend| {
            let solver = create_solver(&cli.config(backend))?;
            measure(&solver, cli.ceiling)
        })
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to install logger");
    }

    let reports = match run(&cli) {
        Ok(reports) => reports,
        Err(err) => {
            error!(%err, "solve failed");
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    for report in &reports {
        println!("{}", report);
        println!();
    }

    if reports.windows(2).any(|pair| pair[0].detail != pair[1].detail) {
        eprintln!("Backends disagree on the longest chain");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
