//! The `psytest init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("psytest.toml").exists() {
        println!("psytest.toml already exists, skipping.");
    } else {
        std::fs::write("psytest.toml", SAMPLE_CONFIG)?;
        println!("Created psytest.toml");
    }

    std::fs::create_dir_all("sessions")?;
    let example_path = Path::new("sessions/example.json");
    if example_path.exists() {
        println!("sessions/example.json already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_SESSION)?;
        println!("Created sessions/example.json");
    }

    println!("\nNext steps:");
    println!("  1. Set GEMINI_API_KEY (needed for personality and productivity reports)");
    println!("  2. Run: psytest validate --session sessions/example.json");
    println!("  3. Run: psytest score --session sessions/example.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# psytest configuration

[gemini]
api_key = "${GEMINI_API_KEY}"
model = "gemini-2.5-flash"
timeout_secs = 240
temperature = 0.7
max_output_tokens = 32768

[retry]
max_retries = 3
retry_delay_ms = 5000
backoff_factor = 2.0
max_delay_ms = 60000
safety_margin_ms = 2000

[scoring]
personality_narrative = true
parallelism = 4
"#;

const EXAMPLE_SESSION: &str = r#"{
  "session_id": "example-iq",
  "test_type": "iq_test",
  "candidate_age": 38,
  "answers": [
    {"question_number": 1, "answer": 4},
    {"question_number": 2, "answer": 5},
    {"question_number": 3, "answer": 1},
    {"question_number": 4, "answer": 2},
    {"question_number": 5, "answer": 6},
    {"question_number": 6, "answer": 3},
    {"question_number": 13, "answer": 2},
    {"question_number": 14, "answer": 6},
    {"question_number": 15, "answer": 3},
    {"question_number": 25, "answer": "8"},
    {"question_number": 26, "answer": "2"}
  ]
}
"#;
