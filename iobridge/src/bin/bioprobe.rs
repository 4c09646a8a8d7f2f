//! Open a device of the in-memory engine, drain the I/O descriptor pool of
//! one channel and give everything back. Useful to check the bridge against
//! an engine build and to see the log redirect at work.
#[macro_use]
extern crate log;

use std::error::Error;

use function_name::named;
use structopt::StructOpt;

use iobridge::{
    config::Config,
    core::{
        bdev_get_bio,
        bridge_env_init,
        BridgeCliArgs,
        CoreError,
        DmaBuf,
        IoBuf,
        IoType,
        MemoryEngine,
    },
    logger::LogLevel,
    maya_log,
};

#[named]
fn main() -> Result<(), Box<dyn Error>> {
    let args = BridgeCliArgs::from_args();
    let cfg = Config::get_or_init(|| match args.config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}, using the default config", e);
            Config::default()
        }
    });

    bridge_env_init(cfg)?;

    let engine = MemoryEngine::new();
    let bdev = engine.create_bdev(
        &args.bdev,
        cfg.pool.block_len,
        cfg.pool.num_blocks,
    )?;
    let desc = engine.open(&args.bdev, true)?;
    let ch = engine.get_io_channel(&desc, cfg.pool.channel_pool_size);

    let mut bufs = Vec::new();
    let mut ios = Vec::new();
    loop {
        let mut buf = DmaBuf::new(bdev.block_len() as usize, 9)?;
        match bdev_get_bio(&engine, &ch, &desc, IoBuf::from(&mut buf)) {
            Ok(mut bio) => {
                bio.set_len(bdev.block_len() as u64)?;
                bio.set_offset(ios.len() as u64 % bdev.num_blocks());
                bio.set_num_blocks(1);
                bio.set_io_type(IoType::Read);
                debug_assert!(bio.is_ready());
                ios.push(bio);
                bufs.push(buf);
            }
            Err(CoreError::EngineExhausted {
                channel,
            }) => {
                maya_log!(
                    LogLevel::Notice,
                    "pool of %s drained after %zu descriptors",
                    channel.as_str(),
                    ios.len()
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "{}: acquired {} I/O descriptors, {} outstanding",
        bdev.name(),
        ios.len(),
        ch.io_outstanding()
    );

    ios.into_iter().for_each(|bio| bio.release(&engine));
    info!(
        "{}: released, {} free, {} outstanding",
        bdev.name(),
        engine.free_ios(&ch),
        ch.io_outstanding()
    );
    drop(bufs);

    Ok(())
}
