use clap::Parser;
use clap_num::maybe_hex;

#[derive(Parser, Debug)]
#[command(disable_help_flag = true)]
pub enum Command {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        pools: usize,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        pool_size: usize,
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
        #[arg(long, value_parser=maybe_hex::<usize>, default_value = "1")]
        align: usize,

        /// Inject right away if the allocation asks for it.
        #[arg(long)]
        inject: bool,
    },
    Inject {
        #[arg(long)]
        allocator: String,
    },
    Print {
        #[arg(long)]
        allocator: Option<String>,
    },

    Exit,
}
