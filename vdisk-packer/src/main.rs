mod cli;

use std::fs;
use std::path::Path;

use clap::Parser;
use typed_bytesize::ByteSizeIec;
use vdisk::{Directory, Entry, Error, VirtualDisk, SEPARATOR};

pub use self::cli::{Cli, Command};

fn main() -> Result<(), Error> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Pack {
            source,
            out,
            size_mib,
        } => pack(&source, &out, size_mib),
        Command::Ls { image } => list(&image),
    }
}

fn pack(source: &Path, out: &Path, size_mib: u64) -> Result<(), Error> {
    println!("source={source:?}\nout={out:?}");

    let disk_size = ByteSizeIec::mib(size_mib).0;
    let disk = VirtualDisk::create_with_size(out, disk_size)?;
    import(&disk.root()?, source)?;

    let usage = disk.check()?;
    println!(
        "{} of {} bytes used, {} blocks ({} free)",
        disk.occupied_space()?,
        disk.size()?,
        usage.blocks,
        usage.free_blocks
    );
    disk.close()
}

/// Copies the host tree below `source` into `root`.
fn import(root: &Directory, source: &Path) -> Result<(), Error> {
    let mut pending = vec![(root.clone(), source.to_path_buf())];
    while let Some((dir, host)) = pending.pop() {
        for item in fs::read_dir(&host)? {
            let item = item?;
            let file_name = item.file_name();
            let name = file_name
                .to_str()
                .ok_or_else(|| Error::InvalidName(file_name.to_string_lossy().into_owned()))?;

            let ty = item.file_type()?;
            if ty.is_dir() {
                log::info!("dir={:?}", item.path());
                pending.push((dir.create_directory(name)?, item.path()));
            } else if ty.is_file() {
                let data = fs::read(item.path())?;
                log::info!("file={:?} size={}", item.path(), data.len());
                dir.create_file(name, 0)?.write_at(0, &data)?;
            } else {
                log::warn!("skipping {:?}, neither a file nor a directory", item.path());
            }
        }
    }
    Ok(())
}

fn list(image: &Path) -> Result<(), Error> {
    let disk = VirtualDisk::load(image)?;

    let mut pending = vec![(Entry::Directory(disk.root()?), String::new())];
    while let Some((entry, path)) = pending.pop() {
        let stat = entry.stat()?;
        match entry {
            Entry::Directory(dir) => {
                println!("{path}{SEPARATOR}  ({} members)", stat.size);
                for member in dir.members()? {
                    let child = format!("{path}{SEPARATOR}{}", member.name()?);
                    pending.push((member, child));
                }
            }
            Entry::File(_) => println!("{path}  {} bytes", stat.size),
        }
    }

    disk.close()
}
