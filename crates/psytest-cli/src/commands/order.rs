//! The `psytest order` command.

use anyhow::Result;

use psytest_core::ordering::question_order;

pub fn execute(session_id: &str, count: u32) -> Result<()> {
    anyhow::ensure!(count >= 1, "count must be at least 1");
    let questions: Vec<u32> = (1..=count).collect();
    let order = question_order(session_id, &questions);
    let line: Vec<String> = order.iter().map(u32::to_string).collect();
    println!("{}", line.join(" "));
    Ok(())
}
