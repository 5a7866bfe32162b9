// Colored terminal output for analysis reports.
//
// Used by `commentsense analyze` when --json is not given.

use colored::Colorize;

use crate::analysis::models::AnalysisReport;
use crate::sentiment::traits::Sentiment;

/// Comments shown per theme before eliding the rest.
const COMMENTS_PER_THEME: usize = 3;
/// Ranked words shown.
const WORDS_SHOWN: usize = 15;

/// Display a full report: sentiment split, themes, questions, top words.
pub fn display_report(report: &AnalysisReport) {
    if report.sentiments.is_empty() {
        println!("No usable comments to analyze.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Comment Analysis ({} comments) ===", report.sentiments.len()).bold()
    );

    display_sentiment_split(report);
    display_themes(report);
    display_questions(report);
    display_word_ranking(report);
}

fn display_sentiment_split(report: &AnalysisReport) {
    let total = report.sentiments.len();
    let count = |s: Sentiment| report.sentiments.iter().filter(|e| e.sentiment == s).count();
    let pct = |c: usize| 100.0 * c as f64 / total as f64;

    let positive = count(Sentiment::Positive);
    let neutral = count(Sentiment::Neutral);
    let negative = count(Sentiment::Negative);

    println!("\n  {}", "Sentiment".bold());
    println!(
        "    {:<10} {:>5}  ({:>5.1}%)",
        "positive".green(),
        positive,
        pct(positive)
    );
    println!(
        "    {:<10} {:>5}  ({:>5.1}%)",
        "neutral".yellow(),
        neutral,
        pct(neutral)
    );
    println!(
        "    {:<10} {:>5}  ({:>5.1}%)",
        "negative".red(),
        negative,
        pct(negative)
    );
}

fn display_themes(report: &AnalysisReport) {
    println!(
        "\n  {}",
        format!("Themes ({})", report.themes.len()).bold()
    );

    if report.themes.is_empty() {
        println!("    {}", "No themes found: comments too few or too scattered.".dimmed());
    }

    for theme in &report.themes {
        println!(
            "\n    {} {}  {}",
            format!("[{}]", theme.theme_id).dimmed(),
            theme.name.cyan().bold(),
            format!("({} comments)", theme.comment_count).dimmed()
        );
        println!("      {}", theme.summary);

        for tc in theme.comments.iter().take(COMMENTS_PER_THEME) {
            let text = tc.comment.text.as_deref().unwrap_or_default();
            println!(
                "        {} {}",
                colorize_sentiment(tc.sentiment),
                super::truncate_chars(text, 100)
            );
        }
        if theme.comments.len() > COMMENTS_PER_THEME {
            println!(
                "        {}",
                format!("... and {} more", theme.comments.len() - COMMENTS_PER_THEME).dimmed()
            );
        }
    }

    if !report.unclustered.is_empty() {
        println!(
            "\n    {}",
            format!("{} comments fit no theme", report.unclustered.len()).dimmed()
        );
    }
}

fn display_questions(report: &AnalysisReport) {
    if report.questions.is_empty() {
        return;
    }
    println!(
        "\n  {}",
        format!("Questions ({})", report.questions.len()).bold()
    );
    for q in &report.questions {
        println!("    ? {}", super::truncate_chars(q.trim(), 120));
    }
}

fn display_word_ranking(report: &AnalysisReport) {
    if report.word_ranking.is_empty() {
        return;
    }
    println!("\n  {}", "Top words".bold());
    let line: Vec<String> = report
        .word_ranking
        .iter()
        .take(WORDS_SHOWN)
        .map(|w| format!("{} {}", w.word, format!("({})", w.count).dimmed()))
        .collect();
    println!("    {}", line.join(", "));
    println!();
}

fn colorize_sentiment(sentiment: Sentiment) -> colored::ColoredString {
    match sentiment {
        Sentiment::Positive => "+".green().bold(),
        Sentiment::Neutral => "=".yellow(),
        Sentiment::Negative => "-".red().bold(),
    }
}
