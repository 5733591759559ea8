//! Models Command
//!
//! Shows the routing state and the model tier tables.
//!
//! Usage:
//!   sophia models [--json]

use console::style;

use crate::ai::{ProviderRouter, TaskTiering};
use crate::cli::ui::Output;
use crate::types::Result;

pub fn run(router: &ProviderRouter, output: &Output) -> Result<()> {
    let tiering = router.tiering();

    if output.is_json() {
        let body = serde_json::json!({
            "default_preference": router.config().ai.default_preference,
            "secondary_available": router.secondary_available(),
            "config": tiering,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    output.header("Model Routing");
    println!(
        "  Default preference: {}",
        style(&router.config().ai.default_preference).cyan()
    );
    let availability = if router.secondary_available() {
        style("available").green()
    } else {
        style("unavailable").red()
    };
    println!("  Secondary provider: {}", availability);

    output.section("Primary (gemini)");
    print_tables(&tiering.primary);
    output.section("Secondary (minimax)");
    print_tables(&tiering.secondary);
    Ok(())
}

fn print_tables(tables: &[TaskTiering]) {
    for table in tables {
        println!("{}", style(table.task).bold());
        for entry in &table.entries {
            println!(
                "  {:<15} {:<28} cost={:<9} speed={:<10} {}",
                format!("{:?}", entry.tier),
                entry.model,
                entry.cost,
                entry.speed,
                style(entry.description).dim()
            );
        }
    }
}
