use sprawl::commands::command_argument_builder;
use sprawl::handlers::{handle_crawl, handle_path, print_banner, wants_banner};

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    if wants_banner(&chosen_command) {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("crawl", primary_command)) => handle_crawl(primary_command).await,
        Some(("path", primary_command)) => handle_path(primary_command),
        None => {}
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
