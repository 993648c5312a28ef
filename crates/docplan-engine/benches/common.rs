// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
#[allow(dead_code)]
pub fn generate_report(sections: usize) -> String {
    let mut content = String::new();
    for section in 0..sections {
        content.push_str(&format!("# Section {section}\n\n"));
        content.push_str("Revenue grew in **every** region while costs held steady.\n\n");
        content.push_str("- Supply costs\n- Hiring plan\n  - Contractors\n\n");
        content.push_str("| Region | Growth |\n| --- | --- |\n| North | 4% |\n| South | 2% |\n\n");
    }
    content
}

#[allow(dead_code)]
pub fn generate_repeated_words(word: &str, count: usize) -> String {
    vec![word; count].join(" ")
}
