//! runs the whole pipeline on fasta files

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use seedsearch::pipeline::{RunOptions, SeqType, search_files};
use seedsearch::utils::parameters::SearchParams;
use seedsearch::utils::progress::{LogProgress, NoProgress};


fn log_init_test() {
    let _ = env_logger::builder().is_test(true).try_init();
}


fn write_fasta(path : &Path, records : &[(&str, &str)]) {
    let mut file = fs::File::create(path).unwrap();
    for (id, seq) in records {
        writeln!(file, ">{} some description", id).unwrap();
        // wrap lines as fasta files usually are
        for chunk in seq.as_bytes().chunks(60) {
            file.write_all(chunk).unwrap();
            writeln!(file).unwrap();
        }
    }
}


const R1 : &str = "ACGTTGCAACGGTACCATGGTTAACCGGTTAAGCTAGCTAGGATCCATGCATGCAAGCTTGGCACTGGCCGTCGTTTTACAACGTCGTGACTGGGAAAAC";
const R2 : &str = "TTGACAGCTAGCTCAGTCCTAGGTATAATGCTAGCGAATTCGAGCTCGGTACCCGGGGATCCTCTAGAGTCGACCTGCAGGCATGCAAGCTTGGCGTAAT";


#[test]
fn test_search_dna_files() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.fa");
    let query_path = dir.path().join("queries.fa");
    let out_path = dir.path().join("hits.tsv");
    write_fasta(&db_path, &[("r1", R1), ("r2", R2)]);
    // q2 has one substitution with r2, q3 shares nothing with the database
    let mut q2 = R2.as_bytes().to_vec();
    q2[50] = b'T';
    let q2 = String::from_utf8(q2).unwrap();
    write_fasta(&query_path, &[("q1", R1), ("q2", &q2), ("q3", "AAAAAAAAAAAAAAAAAAAA")]);
    //
    let options = RunOptions{threads : Some(2), batch_size : 1, ..Default::default()};
    let summary = search_files(&query_path, &db_path, &out_path, &options, Arc::new(LogProgress::default())).unwrap();
    assert_eq!(summary.nb_database_sequences, 2);
    assert_eq!(summary.nb_queries, 3);
    assert_eq!(summary.nb_queries_with_hits, 2);
    assert_eq!(summary.nb_hits, 2);
    //
    let content = fs::read_to_string(&out_path).unwrap();
    let mut lines : Vec<Vec<&str>> = content.lines().map(|l| l.split('\t').collect()).collect();
    lines.sort();
    assert_eq!(lines.len(), 2);
    assert_eq!(&lines[0][..3], &["q1", "r1", "100.0"]);
    assert_eq!(lines[0][11], "100=");
    assert_eq!(&lines[1][..2], &["q2", "r2"]);
    assert_eq!(lines[1][2], "99.0");
    assert_eq!(lines[1][4], "1");
    assert!(!dir.path().join("hits.tsv.partial").exists());
}


#[test]
fn test_search_csv_and_thresholds() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.fa");
    let query_path = dir.path().join("queries.fa");
    let out_path = dir.path().join("hits.csv");
    write_fasta(&db_path, &[("r1", R1), ("r1bis", R1), ("r2", R2)]);
    write_fasta(&query_path, &[("q1", R1)]);
    // 2 accepts : both copies of r1, in database order
    let options = RunOptions{params : SearchParams::new(2, 16, 0.75), threads : Some(1), ..Default::default()};
    let summary = search_files(&query_path, &db_path, &out_path, &options, Arc::new(NoProgress)).unwrap();
    assert_eq!(summary.nb_hits, 2);
    let content = fs::read_to_string(&out_path).unwrap();
    let lines : Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("query,target,identity"));
    assert!(lines[1].starts_with("q1,r1,100.0"));
    assert!(lines[2].starts_with("q1,r1bis,100.0"));
}


#[test]
fn test_search_protein_files() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.fa");
    let query_path = dir.path().join("queries.fa");
    let out_path = dir.path().join("hits.tsv");
    let p1 = "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQFEVVHSLAKWKRQTLGQHDFSAGEGLYTHMKALRPDEDRLSPLHSVYVDQWDWERVMGDGERQFSTLKSTVEAIWAGIKATEAAVSEEFGLAPFLPDQIHFVHSQELLSRYPDLDAKGRERAIAKDLGAVFLVGIGGKLSDGHRHDVRAPDYDDWLAEMS";
    let p2 = "GSHMSLFDFFKNKGSAAATATDRSGSVKASKVLTVSEMAEAIAQLKAGQQVLVVNLQGLDEATRRQLLDFLHGAAFYAGGSQVPLADRSLLLLGERQADSDGLVELDRVLVASLYPKLVHSMLSGLLQAEDL";
    write_fasta(&db_path, &[("p1", p1), ("p2", p2)]);
    write_fasta(&query_path, &[("query_p2", p2)]);
    let options = RunOptions{seq_type : SeqType::Protein, threads : Some(2), ..Default::default()};
    let summary = search_files(&query_path, &db_path, &out_path, &options, Arc::new(NoProgress)).unwrap();
    assert_eq!(summary.nb_hits, 1);
    let content = fs::read_to_string(&out_path).unwrap();
    assert!(content.starts_with("query_p2\tp2\t100.0\t"));
}


#[test]
fn test_missing_query_file() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.fa");
    write_fasta(&db_path, &[("r1", R1)]);
    let out_path = dir.path().join("hits.tsv");
    let res = search_files(&dir.path().join("absent.fa"), &db_path, &out_path, &RunOptions::default(), Arc::new(NoProgress));
    assert!(res.is_err());
    assert!(!out_path.exists());
    assert!(!dir.path().join("hits.tsv.partial").exists());
}
