mod logging;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use flatfs::layout::{DEFAULT_NUM_BLOCKS, MAX_FILE_SIZE};
use flatfs::{vfs, BlockDevice, DeviceError, FsError, OpenFlags, BLOCK_SIZE, MAX_NAME_LENGTH};
use log::{info, warn};
use std::fmt;
use std::fs::{read_dir, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = (file.metadata()?.len() / BLOCK_SIZE as u64) as usize;
        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }

    fn create(path: &str, blocks: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SIZE) as u64)?;
        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }

    fn seek_to(&self, block_id: usize, offset: usize, len: usize) -> Result<std::sync::MutexGuard<'_, File>, DeviceError> {
        if block_id >= self.blocks || offset + len > BLOCK_SIZE {
            return Err(DeviceError::OutOfRange { block_id });
        }
        let mut file = self.file.lock().map_err(|_| DeviceError::Io)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE + offset) as u64))
            .map_err(|_| DeviceError::Io)?;
        Ok(file)
    }
}

impl BlockDevice for BlockFile {
    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(&self, block_id: usize, offset: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.seek_to(block_id, offset, buf.len())?;
        file.read_exact(buf).map_err(|_| DeviceError::Io)
    }

    fn write_block(&self, block_id: usize, offset: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.seek_to(block_id, offset, buf.len())?;
        file.write_all(buf).map_err(|_| DeviceError::Io)
    }
}

#[derive(Debug)]
enum ToolError {
    Io(std::io::Error),
    Fs(FsError),
    Usage(String),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Io(e)
    }
}

impl From<FsError> for ToolError {
    fn from(e: FsError) -> Self {
        ToolError::Fs(e)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Io(e) => write!(f, "host i/o: {}", e),
            ToolError::Fs(e) => write!(f, "flatfs: {}", e),
            ToolError::Usage(msg) => f.write_str(msg),
        }
    }
}

type ToolResult<T> = Result<T, ToolError>;

fn cli() -> App<'static, 'static> {
    let blocks = Arg::with_name("blocks")
        .short("b")
        .long("blocks")
        .takes_value(true)
        .help("Number of blocks in the new image");
    let inodes = Arg::with_name("inodes")
        .short("n")
        .long("inodes")
        .takes_value(true)
        .help("Number of inodes, default when omitted");
    App::new("FlatFileSystem packer")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .default_value("fs.img")
                .help("Disk image file"),
        )
        .subcommand(
            SubCommand::with_name("format")
                .about("Create and format an empty image")
                .arg(blocks.clone())
                .arg(inodes.clone()),
        )
        .subcommand(
            SubCommand::with_name("pack")
                .about("Format an image and copy every file of a host dir into it")
                .arg(
                    Arg::with_name("source")
                        .short("s")
                        .long("source")
                        .takes_value(true)
                        .required(true)
                        .help("Host source dir"),
                )
                .arg(blocks)
                .arg(inodes),
        )
        .subcommand(
            SubCommand::with_name("put")
                .about("Copy a host file into the image")
                .arg(Arg::with_name("host").required(true))
                .arg(Arg::with_name("name")),
        )
        .subcommand(SubCommand::with_name("ls").about("List the root directory"))
        .subcommand(
            SubCommand::with_name("cat")
                .about("Print a file")
                .arg(Arg::with_name("name").required(true)),
        )
        .subcommand(
            SubCommand::with_name("link")
                .about("Add a second name for a file")
                .arg(Arg::with_name("src").required(true))
                .arg(Arg::with_name("dst").required(true)),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("Unlink a name")
                .arg(Arg::with_name("name").required(true)),
        )
        .subcommand(SubCommand::with_name("mask").about("Print the free block mask"))
        .subcommand(SubCommand::with_name("sb").about("Print the superblock"))
}

fn parse_num<T: std::str::FromStr>(matches: &ArgMatches, name: &str, default: T) -> ToolResult<T> {
    match matches.value_of(name) {
        Some(v) => v
            .parse()
            .map_err(|_| ToolError::Usage(format!("invalid --{} value {}", name, v))),
        None => Ok(default),
    }
}

fn main() {
    logging::init();
    if let Err(e) = run(&cli().get_matches()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> ToolResult<()> {
    let image = matches.value_of("image").unwrap_or("fs.img");
    match matches.subcommand() {
        ("format", Some(sub)) => {
            format_image(image, sub)?;
        }
        ("pack", Some(sub)) => {
            format_image(image, sub)?;
            let src_path = sub.value_of("source").unwrap_or(".");
            pack(src_path)?;
        }
        (cmd, sub) => {
            vfs::attach_device(Arc::new(BlockFile::open(image)?));
            vfs::mount(0)?;
            let empty = ArgMatches::default();
            let sub = sub.unwrap_or(&empty);
            match cmd {
                "put" => {
                    let host = Path::new(sub.value_of_os("host").unwrap_or_default());
                    let name = match sub.value_of("name") {
                        Some(name) => name,
                        None => image_name(host).ok_or_else(|| {
                            ToolError::Usage(format!("no usable file name in {}", host.display()))
                        })?,
                    };
                    put(host, name)?;
                }
                "ls" => ls()?,
                "cat" => cat(sub.value_of("name").unwrap_or_default())?,
                "link" => vfs::link(
                    sub.value_of("src").unwrap_or_default(),
                    sub.value_of("dst").unwrap_or_default(),
                )?,
                "rm" => vfs::unlink(sub.value_of("name").unwrap_or_default())?,
                "mask" => print!("{}", vfs::print_free_mask()?),
                "sb" => print!("{}", vfs::dump_superblock()?),
                _ => return Err(ToolError::Usage(format!("unknown command {}", cmd))),
            }
        }
    }
    Ok(())
}

fn format_image(image: &str, sub: &ArgMatches) -> ToolResult<()> {
    let blocks = parse_num(sub, "blocks", DEFAULT_NUM_BLOCKS)?;
    let inodes = parse_num(sub, "inodes", 0i32)?;
    vfs::attach_device(Arc::new(BlockFile::create(image, blocks)?));
    vfs::format(0, inodes)?;
    info!("created {} with {} blocks ({} bytes)", image, blocks, blocks * BLOCK_SIZE);
    Ok(())
}

/// Name a host file gets inside the image, if it has a UTF-8 one.
fn image_name(host: &Path) -> Option<&str> {
    host.file_name().and_then(|name| name.to_str())
}

fn put(host: &Path, name: &str) -> ToolResult<()> {
    let mut all_data: Vec<u8> = Vec::new();
    File::open(host)?.read_to_end(&mut all_data)?;
    if all_data.len() > MAX_FILE_SIZE {
        return Err(FsError::UnsupportedFileSize.into());
    }
    let fd = vfs::create(name, OpenFlags::CREATE)?;
    let written = vfs::write(fd, all_data.as_slice());
    vfs::close(fd)?;
    info!("Processing file: {}, size: {} bytes", name, written?);
    Ok(())
}

fn pack(src_path: &str) -> ToolResult<()> {
    let mut packed = 0;
    for dir_entry in read_dir(src_path)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }
        let host = dir_entry.path();
        let name = match image_name(&host) {
            Some(name) => name,
            None => {
                warn!("skipping {}: file name is not UTF-8", host.display());
                continue;
            }
        };
        if name.len() > MAX_NAME_LENGTH {
            warn!("skipping {}: name longer than {} bytes", name, MAX_NAME_LENGTH);
            continue;
        }
        match put(&host, name) {
            Ok(()) => packed += 1,
            Err(ToolError::Fs(e @ FsError::UnsupportedFileSize)) => warn!("skipping {}: {}", name, e),
            Err(e) => return Err(e),
        }
    }
    info!("packed {} files from {}", packed, src_path);
    Ok(())
}

fn ls() -> ToolResult<()> {
    for (name, inode_num) in vfs::list()? {
        let inode = vfs::stat(&name)?;
        println!("{:>4} {:>3} {:>6} {}", inode_num, inode.nlink, inode.size, name);
    }
    Ok(())
}

fn cat(name: &str) -> ToolResult<()> {
    let fd = vfs::open(name, OpenFlags::RDONLY)?;
    let mut buf = [0u8; BLOCK_SIZE];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let len = match vfs::read(fd, &mut buf) {
            Ok(len) => len,
            Err(e) => {
                vfs::close(fd)?;
                return Err(e.into());
            }
        };
        if len == 0 {
            break;
        }
        out.write_all(&buf[..len])?;
    }
    vfs::close(fd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatfs::FlatFileSystem;

    #[test]
    fn parses_subcommands() {
        let m = cli().get_matches_from(vec!["flatfs_fuse", "-i", "x.img", "link", "a", "b"]);
        assert_eq!(m.value_of("image"), Some("x.img"));
        let (cmd, sub) = m.subcommand();
        assert_eq!(cmd, "link");
        let sub = sub.unwrap();
        assert_eq!(sub.value_of("src"), Some("a"));
        assert_eq!(sub.value_of("dst"), Some("b"));

        let m = cli().get_matches_from(vec!["flatfs_fuse", "format", "--blocks", "64"]);
        assert_eq!(m.value_of("image"), Some("fs.img"));
        let sub = m.subcommand_matches("format").unwrap();
        assert_eq!(parse_num(sub, "blocks", 0usize).unwrap(), 64);
        assert_eq!(parse_num(sub, "inodes", 0i32).unwrap(), 0);
    }

    #[test]
    fn image_names_come_from_the_last_component() {
        assert_eq!(image_name(Path::new("/tmp/data/notes.txt")), Some("notes.txt"));
        assert_eq!(image_name(Path::new("notes.txt")), Some("notes.txt"));
        assert_eq!(image_name(Path::new("/")), None);
    }

    #[test]
    fn image_file_survives_remount() {
        let path = std::env::temp_dir().join(format!("flatfs-{}.img", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        {
            let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(&path, 128).unwrap());
            let mut fs = FlatFileSystem::format(dev, 0, 16).unwrap();
            let fd = fs.create("greeting", OpenFlags::CREATE).unwrap();
            assert_eq!(fs.write(fd, b"hi there").unwrap(), 8);
        }
        {
            let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::open(&path).unwrap());
            assert_eq!(dev.num_blocks(), 128);
            let mut fs = FlatFileSystem::mount(dev, 0).unwrap();
            let fd = fs.open("greeting", OpenFlags::RDONLY).unwrap();
            let mut buf = [0u8; 16];
            assert_eq!(fs.read(fd, &mut buf).unwrap(), 8);
            assert_eq!(&buf[..8], b"hi there");
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn block_file_bounds() {
        let path = std::env::temp_dir().join(format!("flatfs-bounds-{}.img", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        let dev = BlockFile::create(&path, 2).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            dev.read_block(2, 0, &mut buf),
            Err(DeviceError::OutOfRange { block_id: 2 })
        );
        dev.write_block(1, BLOCK_SIZE - 4, b"tail").unwrap();
        dev.read_block(1, BLOCK_SIZE - 4, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");
        let _ = std::fs::remove_file(&path);
    }
}
