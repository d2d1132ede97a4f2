use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};

use tapehoard_core::aldc::AldcDecompressor;
use tapehoard_core::blockreader::BlockReader;
use tapehoard_core::ecc::{EccOptions, EccStripper};
use tapehoard_core::endian::ByteOrder3;
use tapehoard_core::entry::{Entry, EntryKind, EntrySource};
use tapehoard_core::format::{
    arcserve::ArcServeDriver,
    filesafe::{detect_variant, FileSafeDriver},
    hp_backup_exec::{parse_catalog, HpBackupExecDriver},
    macait::MacAitDriver,
    mtf::MtfDriver,
    novanet::NovaNetDriver,
    novastor::NovaStorV4Driver,
    qicstream_v1::QicStreamV1Driver,
    qicstream_v2::QicStreamV2Driver,
    qicstream_v4::QicStreamV4Driver,
    qicstream_win95::QicStreamWin95Driver,
    savlib::{SavLibDriver, SavLibOptions},
    txplus::{TxplusDriver, TxplusOptions},
    xenix::{XenixDriver, XenixOptions, XenixVersion},
};
use tapehoard_core::output::OutputSink;
use tapehoard_core::qic122::{Qic122Decompressor, Qic122WindowSize};
use tapehoard_core::segment::{AbsPosWidth, FrameSizeWidth, SegmentExpander, SegmentExpanderOptions};

#[derive(Parser)]
#[clap(author, version, about = "Recovers files from legacy tape and floppy backup dump images.")]
#[clap(propagate_version = true)]
struct Cli {
    /// Raise log verbosity to debug, same as setting RUST_LOG=debug.
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strips trailing ECC bytes from fixed-size segments.
    Ecc {
        #[clap(short = 'f', long)]
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(long)]
        segsize: usize,
        #[clap(long)]
        eccsize: usize,
    },
    /// Runs the segment expander (frame decompression phase) over a QIC-113 image.
    Expand {
        #[clap(short = 'f', long)]
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(long)]
        segsize: u64,
        #[clap(long, default_value = "4")]
        absposwidth: u8,
        #[clap(long, default_value = "2")]
        framesizewidth: u8,
        #[clap(long)]
        haveextentoffset: bool,
        #[clap(long, value_enum, default_value = "qic122-wide")]
        codec: Codec,
    },
    /// Recovers entries from a recognized catalog/tape format and writes them to a directory.
    Recover {
        #[clap(value_enum)]
        format: Format,
        #[clap(short = 'f', long)]
        input: PathBuf,
        #[clap(short, long, default_value = "out")]
        dir: PathBuf,
        #[clap(long, default_value = "0")]
        offset: u64,
        /// Inspect and list entries without writing them.
        #[clap(long)]
        dry: bool,
        /// List catalog entries only; implies --dry.
        #[clap(long)]
        catdump: bool,
        /// Xenix direct block pointer byte order.
        #[clap(long, value_enum, default_value = "little")]
        endianness: Endianness,
        /// Separate catalog stream, required by HP/Backup Exec (catalog and data arrive as two
        /// distinct inputs on that format's tapes).
        #[clap(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Codec {
    Qic122Narrow,
    Qic122Wide,
    Aldc,
}

#[derive(Clone, Copy, ValueEnum)]
enum Endianness {
    Little,
    Big,
    Pdp11,
}

impl From<Endianness> for ByteOrder3 {
    fn from(e: Endianness) -> Self {
        match e {
            Endianness::Little => ByteOrder3::Little,
            Endianness::Big => ByteOrder3::Big,
            Endianness::Pdp11 => ByteOrder3::Pdp11,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    QicstreamV1,
    QicstreamWin95,
    QicstreamV2,
    QicstreamV4,
    Maynstream,
    HpBackupExec,
    Arcserve,
    Novastor,
    Novanet,
    Filesafe,
    Macait,
    Mtf,
    Savlib,
    Txplus,
    XenixV2,
    XenixV3,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    match cli.command {
        Commands::Ecc {
            input,
            output,
            segsize,
            eccsize,
        } => run_ecc(&input, &output, segsize, eccsize),
        Commands::Expand {
            input,
            output,
            segsize,
            absposwidth,
            framesizewidth,
            haveextentoffset,
            codec,
        } => run_expand(
            &input,
            &output,
            segsize,
            absposwidth,
            framesizewidth,
            haveextentoffset,
            codec,
        ),
        Commands::Recover {
            format,
            input,
            dir,
            offset,
            dry,
            catdump,
            endianness,
            catalog,
        } => run_recover(
            format,
            &input,
            &dir,
            offset,
            dry || catdump,
            catdump,
            endianness,
            catalog.as_deref(),
        ),
    }
}

fn run_ecc(input: &PathBuf, output: &PathBuf, segsize: usize, eccsize: usize) -> anyhow::Result<()> {
    let source = BufReader::new(File::open(input).with_context(|| format!("opening {}", input.display()))?);
    let sink = BufWriter::new(File::create(output).with_context(|| format!("creating {}", output.display()))?);
    let stripper = EccStripper::new(EccOptions { seg_size: segsize, ecc_size: eccsize });
    let written = stripper.strip(source, sink)?;
    println!("wrote {written} bytes to {}", output.display());
    Ok(())
}

fn run_expand(
    input: &PathBuf,
    output: &PathBuf,
    segsize: u64,
    absposwidth: u8,
    framesizewidth: u8,
    haveextentoffset: bool,
    codec: Codec,
) -> anyhow::Result<()> {
    let abs_pos_width = match absposwidth {
        4 => AbsPosWidth::Four,
        8 => AbsPosWidth::Eight,
        other => return Err(anyhow!("unsupported --absposwidth {other}, expected 4 or 8")),
    };
    let frame_size_width = match framesizewidth {
        2 => FrameSizeWidth::Two,
        4 => FrameSizeWidth::Four,
        other => return Err(anyhow!("unsupported --framesizewidth {other}, expected 2 or 4")),
    };
    let options = SegmentExpanderOptions {
        seg_size: segsize,
        abs_pos_width,
        frame_size_width,
        have_extent_offset: haveextentoffset,
    };

    let mut source = BlockReader::new(BufReader::new(
        File::open(input).with_context(|| format!("opening {}", input.display()))?,
    ));
    let mut sink = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let output_dir = output.parent().map(PathBuf::from).unwrap_or_default();
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "split".to_string());

    let mut open_split = |n: u32| -> tapehoard_core::Result<Box<dyn tapehoard_core::segment::WriteSeek>> {
        let mut path = output_dir.clone();
        path.push(format!("{stem}_{n}"));
        let file = File::create(&path)?;
        Ok(Box::new(file))
    };

    match codec {
        Codec::Qic122Narrow => {
            let mut expander = SegmentExpander::new(options, Qic122Decompressor::new(Qic122WindowSize::Narrow));
            expander.expand(&mut source, &mut sink, &mut open_split)?;
        }
        Codec::Qic122Wide => {
            let mut expander = SegmentExpander::new(options, Qic122Decompressor::new(Qic122WindowSize::Wide));
            expander.expand(&mut source, &mut sink, &mut open_split)?;
        }
        Codec::Aldc => {
            let mut expander = SegmentExpander::new(options, AldcDecompressor::new());
            expander.expand(&mut source, &mut sink, &mut open_split)?;
        }
    }
    println!("expanded {} -> {}", input.display(), output.display());
    Ok(())
}

fn run_recover(
    format: Format,
    input: &PathBuf,
    dir: &PathBuf,
    offset: u64,
    dry: bool,
    catdump: bool,
    endianness: Endianness,
    catalog: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let mut file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    file.seek(SeekFrom::Start(offset))?;

    if !dry {
        fs::create_dir_all(dir)?;
    }
    let sink = OutputSink::new(dir.clone(), dry);

    let mut driver: Box<dyn EntrySource<'static>> = match format {
        Format::QicstreamV1 => Box::new(QicStreamV1Driver::new(BlockReader::new(file))),
        Format::QicstreamWin95 => Box::new(QicStreamWin95Driver::new(BlockReader::new(file))),
        Format::QicstreamV2 => Box::new(QicStreamV2Driver::new(BlockReader::new(file))),
        Format::QicstreamV4 => Box::new(QicStreamV4Driver::new(
            BlockReader::new(file),
            tapehoard_core::format::qicstream_v4::Variant::QicStreamV4,
        )),
        Format::Maynstream => Box::new(QicStreamV4Driver::new(
            BlockReader::new(file),
            tapehoard_core::format::qicstream_v4::Variant::Maynstream,
        )),
        Format::HpBackupExec => {
            let catalog_path = catalog.ok_or_else(|| {
                anyhow!("hp-backup-exec requires --catalog <path> alongside the data image")
            })?;
            let catalog_file = File::open(catalog_path)
                .with_context(|| format!("opening {}", catalog_path.display()))?;
            let mut catalog_reader = BlockReader::new(BufReader::new(catalog_file));
            let records = parse_catalog(&mut catalog_reader)?;
            Box::new(HpBackupExecDriver::new(BlockReader::new(file), records))
        }
        Format::Arcserve => Box::new(ArcServeDriver::new(BlockReader::new(file))),
        Format::Novastor => Box::new(NovaStorV4Driver::new(BlockReader::new(file))),
        Format::Novanet => Box::new(NovaNetDriver::new(BlockReader::new(file))),
        Format::Filesafe => {
            let mut prefix = [0u8; 4];
            file.read_exact(&mut prefix)?;
            file.seek(SeekFrom::Start(offset))?;
            let variant = detect_variant(&prefix, None);
            Box::new(FileSafeDriver::open(BlockReader::new(file), variant)?)
        }
        Format::Macait => Box::new(MacAitDriver::new(BlockReader::new(file))),
        Format::Mtf => Box::new(MtfDriver::new(BlockReader::new(file))),
        Format::Savlib => Box::new(SavLibDriver::new(BlockReader::new(file), SavLibOptions::default())),
        Format::Txplus => Box::new(TxplusDriver::new(BlockReader::new(file), TxplusOptions::default())),
        Format::XenixV2 => {
            let options = XenixOptions {
                version: XenixVersion::V2,
                base_offset: 0,
                byte_order: endianness.into(),
                force_heuristic: false,
            };
            Box::new(XenixDriver::open(BlockReader::new(file), options)?)
        }
        Format::XenixV3 => {
            let options = XenixOptions {
                version: XenixVersion::V3,
                base_offset: 0,
                byte_order: endianness.into(),
                force_heuristic: true,
            };
            Box::new(XenixDriver::open(BlockReader::new(file), options)?)
        }
    };

    let mut count = 0u64;
    while let Some(mut entry) = driver.next_entry()? {
        report_entry(&entry);
        if !catdump {
            let path = sink.write_entry(&mut entry)?;
            let _ = path;
        }
        count += 1;
    }
    println!("recovered {count} entries");
    Ok(())
}

fn report_entry(entry: &Entry) {
    let kind = match entry.kind {
        EntryKind::File => "file",
        EntryKind::Directory => "dir",
        EntryKind::Volume => "volume",
        EntryKind::Catalog => "catalog",
        EntryKind::Skip => "skip",
    };
    let path = entry.path.join("/");
    println!("{kind:<8} {:>10}  {path}", entry.size);
}
