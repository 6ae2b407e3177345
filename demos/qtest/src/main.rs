mod alloc;
mod console;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use argh::FromArgs;

use self::alloc::FaultyAlloc;
use self::console::{Console, Flow};

#[global_allocator]
static ALLOC: FaultyAlloc = FaultyAlloc::new();

#[derive(Debug, FromArgs)]
/// Interactive tester for the string queue
#[argh(help_triggers("--help"))]
struct Args {
    /// read commands from a file instead of stdin
    #[argh(option, short = 'f')]
    file: Option<PathBuf>,
    /// percentage of allocations to fail while inserting
    #[argh(option, default = "0")]
    fail: u32,
    /// buffer length used when removing elements
    #[argh(option, default = "1024")]
    length: usize,
    /// seed for random strings and allocation failures
    #[argh(option)]
    seed: Option<u64>,
    /// echo each command before running it
    #[argh(switch, short = 'v')]
    echo: bool,
}

pub fn main() -> Result<()> {
    let args = argh::from_env::<Args>();
    tracing_subscriber::fmt()
        .without_time()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let seed = args.seed.unwrap_or_else(|| fastrand::u64(..));
    tracing::info!("started qtest, seed={seed}, fail={}%", args.fail);
    ALLOC.seed(seed);
    ALLOC.set_fail_percent(args.fail);

    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|e| anyhow!("open({}): {e}", path.display()))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };

    let mut console = Console::new(&ALLOC, args.length, seed, std::io::stdout().lock());
    for line in input.lines() {
        let line = line?;
        if args.echo {
            println!("cmd> {line}");
        }
        if let Flow::Quit = console.run_line(&line) {
            break;
        }
    }

    let errors = console.errors();
    // Release the queue before reporting.
    drop(console);
    if errors > 0 {
        bail!("{errors} error(s) occurred");
    }
    tracing::info!("exited qtest");
    Ok(())
}
