//! seedsearch --query [-q] queries.fa --db [-d] database.fa --out [-o] hits.tsv
//!
//! - query : fasta or fastq file (possibly gzipped) of query sequences
//! - db : fasta or fastq file (possibly gzipped) of database sequences, indexed in memory
//! - out : output file, csv if its extension is .csv, tab separated otherwise (see --format)
//!
//! --min-identity [-i] : minimal identity of an accepted hit, in [0,1]. Default 0.75
//!
//! --max-accepts [-a] : number of accepted hits after which search of a query stops. Default 1
//!
//! --max-rejects [-r] : number of consecutive rejected candidates after which search of a query stops. Default 16
//!
//! --word-size [-k] : kmer size used as seed. Default 8 for dna, 5 for protein
//!
//! --threads [-t] : number of search threads. Default is all cpus
//!
//! --protein : sequences are amino acids. Default is dna
//!
//! --format : output format when it cannot be deduced from output extension, tsv or csv
//!
//! --params : a json parameter file (as dumped by --dump-params) used instead of defaults.
//!     Thresholds given on command line override the file values.
//!
//! --dump-params : directory where parameters used in the run are dumped as seedsearch.parameters.json

use clap::{Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use seedsearch::hitwriter::OutputFormat;
use seedsearch::pipeline::{RunOptions, SeqType, search_files};
use seedsearch::utils::parameters::SearchParams;
use seedsearch::utils::progress::LogProgress;


// install a logger facility
fn init_log() -> u64 {
    Builder::from_default_env().init();
    println!("\n ************** initializing logger *****************\n");
    1
}


fn build_command() -> Command {
    Command::new("seedsearch")
        .version("0.1.0")
        .about("Search query sequences against a database by kmer seeds and global alignment identity")
        .arg(Arg::new("query")
            .short('q')
            .long("query")
            .value_name("QUERY_FILE")
            .help("fasta/fastq file of query sequences")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("database")
            .short('d')
            .long("db")
            .value_name("DB_FILE")
            .help("fasta/fastq file of database sequences")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("output")
            .short('o')
            .long("out")
            .value_name("OUTPUT_FILE")
            .help("output file of hits")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("min_identity")
            .short('i')
            .long("min-identity")
            .value_name("IDENTITY")
            .help("minimal identity of a hit, in [0,1], default 0.75")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(f32)))
        .arg(Arg::new("max_accepts")
            .short('a')
            .long("max-accepts")
            .help("number of hits after which search of a query stops, default 1")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("max_rejects")
            .short('r')
            .long("max-rejects")
            .help("number of consecutive rejected candidates after which search of a query stops, default 16")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("word_size")
            .short('k')
            .long("word-size")
            .help("kmer size, default 8 for dna and 5 for protein")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("threads")
            .short('t')
            .long("threads")
            .help("number of search threads, default all cpus")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("protein")
            .long("protein")
            .help("sequences are amino acids")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("format")
            .long("format")
            .help("output format if not deduced from output extension : tsv or csv")
            .action(ArgAction::Set)
            .value_parser(["tsv", "csv"])
            .default_value("tsv"))
        .arg(Arg::new("params")
            .long("params")
            .value_name("PARAMS_FILE")
            .help("json file of search parameters")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("dump_params")
            .long("dump-params")
            .value_name("DIR")
            .help("directory where search parameters are dumped")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(PathBuf)))
} // end of build_command



fn parse_params(matches : &ArgMatches) -> anyhow::Result<SearchParams> {
    let mut params = match matches.get_one::<PathBuf>("params") {
        Some(path) => SearchParams::reload_json(path)?,
        None => SearchParams::default(),
    };
    if let Some(min_identity) = matches.get_one::<f32>("min_identity") {
        params.min_identity = *min_identity;
    }
    if let Some(max_accepts) = matches.get_one::<usize>("max_accepts") {
        params.max_accepts = *max_accepts;
    }
    if let Some(max_rejects) = matches.get_one::<usize>("max_rejects") {
        params.max_rejects = *max_rejects;
    }
    if let Some(word_size) = matches.get_one::<usize>("word_size") {
        params = params.with_word_size(*word_size);
    }
    params.check()?;
    Ok(params)
} // end of parse_params



fn main() -> anyhow::Result<()> {
    let _ = init_log();
    let matches = build_command().get_matches();
    //
    let params = parse_params(&matches)?;
    if let Some(dirpath) = matches.get_one::<PathBuf>("dump_params") {
        let dumped = params.dump_json(dirpath)?;
        log::info!("parameters dumped in {:?}", dumped);
    }
    let seq_type = if matches.get_flag("protein") { SeqType::Protein } else { SeqType::Dna };
    let default_format = matches.get_one::<String>("format").map(|f| f.parse::<OutputFormat>()).transpose()?
            .unwrap_or(OutputFormat::Tabular);
    let options = RunOptions{params, threads : matches.get_one::<usize>("threads").copied(), default_format, seq_type,
            ..Default::default()};
    //
    let query_path : &Path = matches.get_one::<PathBuf>("query").map(|p| p.as_path()).ok_or_else(|| anyhow::anyhow!("query file missing"))?;
    let database_path : &Path = matches.get_one::<PathBuf>("database").map(|p| p.as_path()).ok_or_else(|| anyhow::anyhow!("database file missing"))?;
    let output_path : &Path = matches.get_one::<PathBuf>("output").map(|p| p.as_path()).ok_or_else(|| anyhow::anyhow!("output file missing"))?;
    log::info!("seedsearch {} queries : {:?}, database : {:?}, output : {:?}", seq_type, query_path, database_path, output_path);
    //
    let summary = search_files(query_path, database_path, output_path, &options, Arc::new(LogProgress::default()))?;
    println!("nb database sequences : {}", summary.nb_database_sequences);
    println!("nb queries : {}, nb queries with hits : {}, nb hits : {}", summary.nb_queries, summary.nb_queries_with_hits, summary.nb_hits);
    println!("system time(s) : {:.3}, cpu time(s) : {:.3}", summary.elapsed.as_secs_f32(), summary.cpu_time.as_secs_f32());
    Ok(())
} // end of main



// end of mod tests
