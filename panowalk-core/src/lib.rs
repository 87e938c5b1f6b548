pub mod data;
pub mod report;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
 ___  __ _ _ __   _____      ____ _| | | __
| '_ \/ _` | '_ \ / _ \ \ /\ / / _` | | |/ /
| |_) (_| | | | | (_) \ V  V / (_| | |   <
| .__/\__,_|_| |_|\___/ \_/\_/ \__,_|_|_|\_\
|_|"#;
    println!("{}", banner.bright_cyan());
    println!(
        "{}\n",
        format!("  geofenced panorama crawler v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
