//! The `psytest key` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use psytest_core::answer_key::{
    age_coefficient, correct_answer, global_question_number, series_of, IQ_BANDS, IQ_FLOOR,
    ITEMS_PER_SERIES, SERIES,
};

pub fn execute(question: Option<u32>, series: Option<char>, index: Option<u32>) -> Result<()> {
    let lookup = match (question, series, index) {
        (Some(q), _, _) => Some(series_of(q)?),
        (None, Some(s), Some(i)) => {
            let s = s.to_ascii_uppercase();
            global_question_number(s, i)?;
            Some((s, i))
        }
        _ => None,
    };

    match lookup {
        Some((s, i)) => print_single(s, i),
        None => print_full_key(),
    }
}

fn print_single(series: char, index: u32) -> Result<()> {
    let number = global_question_number(series, index)?;
    let answer = correct_answer(series, index)
        .ok_or_else(|| anyhow::anyhow!("no key entry for {series}{index}"))?;
    println!("Question {number} ({series}{index}): correct answer {answer}");
    Ok(())
}

fn print_full_key() -> Result<()> {
    let mut key = Table::new();
    let mut header = vec![Cell::new("Series")];
    header.extend((1..=ITEMS_PER_SERIES).map(Cell::new));
    key.set_header(header);
    for s in SERIES {
        let mut row = vec![Cell::new(s)];
        for i in 1..=ITEMS_PER_SERIES {
            let answer = correct_answer(s, i).map_or("-".to_string(), |a| a.to_string());
            row.push(Cell::new(answer));
        }
        key.add_row(row);
    }
    println!("Answer key\n{key}");

    let mut bands = Table::new();
    bands.set_header(vec!["Raw score", "IQ"]);
    for band in IQ_BANDS {
        let iq = if band.min_iq == band.max_iq {
            band.min_iq.to_string()
        } else if band.min_iq == 0 {
            format!("{IQ_FLOOR} and below")
        } else {
            format!("{}-{}", band.min_iq, band.max_iq)
        };
        bands.add_row(vec![
            Cell::new(format!("{}-{}", band.min_score, band.max_score)),
            Cell::new(iq),
        ]);
    }
    println!("\nIQ bands\n{bands}");

    let mut ages = Table::new();
    ages.set_header(vec!["Age", "Coefficient"]);
    for age in [30, 35, 40, 45, 50, 55, 60, 61] {
        let label = match age {
            30 => "up to 30".to_string(),
            61 => "over 60".to_string(),
            a => a.to_string(),
        };
        ages.add_row(vec![
            Cell::new(label),
            Cell::new(format!("{:.2}", age_coefficient(age))),
        ]);
    }
    println!("\nAge correction\n{ages}");

    Ok(())
}
