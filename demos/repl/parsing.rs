use clap::Parser;
use clap_num::maybe_hex;

#[derive(Parser, Debug)]
#[command(disable_help_flag = true)]
pub enum Command {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        capacity: usize,
    },
    Delete {
        #[arg(long)]
        allocator: String,
    },
    Alloc {
        #[arg(long)]
        allocator: String,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        size: usize,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        align: Option<usize>,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        stream: Option<usize>,
    },
    Free {
        #[arg(long)]
        allocator: String,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        base: usize,
    },
    Eq {
        #[arg(long)]
        left: String,
        #[arg(long)]
        right: String,
    },
    Print {
        #[arg(long)]
        allocator: Option<String>,
    },

    Exit,
}
