//! Probe CLI subcommands: scrape, health.
//!
//! Both build a runtime from the environment, run one collection cycle and
//! print the result. Exit codes: 0 success/healthy, 1 unhealthy, 2 output
//! error.

use crate::config;
use crate::VitalsRuntime;

/// Print the exposition text for one fresh cycle.
pub async fn run_scrape() -> i32 {
    let runtime = VitalsRuntime::new(config::load());
    let response = runtime.scrape_handler().scrape().await;
    print!("{}", response.body);
    runtime.shutdown().await;
    0
}

/// Print the health summary as JSON; exit 0 only when healthy.
pub async fn run_health(pretty: bool) -> i32 {
    let runtime = VitalsRuntime::new(config::load());
    let summary = runtime.health_handler().health().await;
    runtime.shutdown().await;

    let rendered = if pretty {
        serde_json::to_string_pretty(&summary)
    } else {
        serde_json::to_string(&summary)
    };
    match rendered {
        Ok(json) => {
            println!("{}", json);
            if summary.healthy {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Failed to encode health summary: {}", e);
            2
        }
    }
}
