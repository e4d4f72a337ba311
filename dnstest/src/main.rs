use core::error::Error;

use clap::Parser;
use dnstest::{cfg::Config, cmd::Cmd, runtime::Runtime};
use tokio::runtime::Builder;

pub fn main() {
    let cmd = Cmd::parse();

    if let Err(err) = run(cmd) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(cmd: Cmd) -> Result<(), Box<dyn Error>> {
    dnstest::logging::init(cmd.verbose as usize)?;
    let cfg: Config = cmd.try_into()?;
    let json = cfg.json;

    // Init I/O runtime. Workers run on their own threads.
    let snapshot = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .thread_name("runtime")
        .build()?
        .block_on(async {
            let runtime = Runtime::new(cfg);

            runtime.run().await
        })?;

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        println!("{snapshot}");
    }

    Ok(())
}
