use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use swath_pipeline::config::{CorpusConfig, Settings};
use swath_pipeline::error::{PipelineError, Result};
use swath_pipeline::pipeline;

const CONTROL: [&str; 3] = ["101", "102", "103"];
const PBS: [&str; 3] = ["104", "105", "106"];
const SC: [&str; 3] = ["107", "108", "109"];
const PROTEINS: usize = 12;

fn peak(p: usize) -> String {
    format!("sp|P{:05}|PROT{}_PIG", p, p)
}

fn kegg(p: usize) -> String {
    format!("{}", 100_000 + p)
}

/// Intensity of protein `p` for one replicate run. Proteins 0-2 are four
/// times higher under SC, proteins 3-4 four times lower under PBS.
fn intensity(subject: &str, p: usize, replicate: usize) -> f64 {
    let s: usize = subject.parse().unwrap();
    let jitter = ((s * 5 + p * 3 + replicate * 7) % 7) as f64 - 3.0;
    let mut v = (1000.0 + 150.0 * p as f64) * (1.0 + 0.01 * jitter);
    if SC.contains(&subject) && p < 3 {
        v *= 4.0;
    }
    if PBS.contains(&subject) && (3..5).contains(&p) {
        v *= 0.25;
    }
    v
}

fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("swath_pipeline_e2e_{name}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_inputs(dir: &Path, mapped: usize) -> Settings {
    let subjects: Vec<&str> = CONTROL.iter().chain(&PBS).chain(&SC).copied().collect();

    // Wide abundance export: replicate block, then mean block.
    let mut header = vec!["Peak Name".to_string()];
    for s in &subjects {
        header.push(format!("{s}_sample 1"));
        header.push(format!("{s}_sample 2"));
    }
    for s in &subjects {
        header.push(format!("{s}_mean"));
    }
    let mut lines = vec![header.join(",")];
    for p in 0..PROTEINS {
        let mut row = vec![peak(p)];
        let mut means = Vec::new();
        for s in &subjects {
            let r1 = intensity(s, p, 1);
            let r2 = intensity(s, p, 2);
            // One cell missing in a single replicate.
            if p == 11 && *s == "101" {
                row.push(format!("{r1:.4}"));
                row.push(String::new());
                means.push(format!("{r1:.4}"));
            } else {
                row.push(format!("{r1:.4}"));
                row.push(format!("{r2:.4}"));
                means.push(format!("{:.4}", (r1 + r2) / 2.0));
            }
        }
        row.extend(means);
        lines.push(row.join(","));
    }
    let abundance = dir.join("abundance.csv");
    fs::write(&abundance, lines.join("\n")).unwrap();

    let mut clinical = vec!["Piglet,Included,Group,Sex,Date".to_string()];
    for (i, s) in subjects.iter().enumerate() {
        let group = if SC.contains(s) {
            "HI+HTH+SC"
        } else if PBS.contains(s) {
            "HI+HTH+PBS"
        } else {
            "CONTROL"
        };
        let sex = if i % 2 == 0 { "M" } else { "F" };
        clinical.push(format!("{s},yes,{group},{sex},2021-03-{:02}", i + 1));
    }
    clinical.push("110,no,CONTROL,M,2021-03-20".to_string());
    let clinical_path = dir.join("clinical.csv");
    fs::write(&clinical_path, clinical.join("\n")).unwrap();

    let mapping: Vec<String> = (0..mapped)
        .map(|p| format!("ssc:{}\tup:P{:05}", kegg(p), p))
        .collect();
    let mapping_path = dir.join("uniprot_kegg.tsv");
    fs::write(&mapping_path, mapping.join("\n")).unwrap();

    let gmt = [
        format!("ssc00001\tSC responsive\t{}\t{}\t{}\t{}", kegg(0), kegg(1), kegg(2), kegg(9)),
        format!("ssc00002\tPBS responsive\t{}\t{}\t{}", kegg(3), kegg(4), kegg(10)),
        format!("ssc00003\tHousekeeping\t{}\t{}\t{}", kegg(6), kegg(7), kegg(8)),
    ];
    let corpus_path = dir.join("kegg.gmt");
    fs::write(&corpus_path, gmt.join("\n")).unwrap();

    let mut settings = Settings::default();
    settings.storage.abundance_path = Some(abundance);
    settings.storage.clinical_path = Some(clinical_path);
    settings.groups.sc_subjects = SC.iter().map(|s| s.to_string()).collect();
    settings.groups.pbs_subjects = PBS.iter().map(|s| s.to_string()).collect();
    settings.analysis.sparse_components = 2;
    settings.analysis.sparse_cardinality = 3;
    settings.enrichment.id_mapping_path = Some(mapping_path);
    settings.enrichment.corpora = vec![CorpusConfig {
        name: "KEGG".into(),
        path: corpus_path,
    }];
    settings.enrichment.min_set_size = 2;
    settings.enrichment.permutations = 200;
    settings
}

#[test]
fn full_run_writes_every_stage() -> Result<()> {
    let dir = fixture_dir("full");
    let settings = write_inputs(&dir, PROTEINS);
    let results = dir.join("results");

    let summary = pipeline::run(&settings, &results, &ProgressBar::hidden())?;

    assert_eq!(summary.replicate_samples, 18);
    assert_eq!(summary.subjects, 9);
    assert_eq!(summary.proteins, PROTEINS);
    assert_eq!(summary.missing_replicate_cells, 1);
    assert_eq!(summary.mean_cells_resolved, 1);
    assert_eq!(summary.group_label_mismatches, 0);
    assert!(summary.subjects_per_group.values().all(|&n| n == 3));
    assert_eq!(summary.tidy_rows, 18 * PROTEINS);
    assert_eq!(summary.tested_proteins + summary.skipped_proteins, PROTEINS);
    assert_eq!(summary.complete_case_proteins, PROTEINS - 1);
    assert!(summary.pca_components > 0);
    assert_eq!(summary.sparse_components, 2);

    assert!(summary.significant_per_contrast["HI+HTH+SC-CONTROL"] >= 3);
    assert!(summary.significant_per_contrast["HI+HTH+PBS-CONTROL"] >= 2);

    assert_eq!(summary.enrichment.len(), 3);
    let sc = &summary.enrichment["HI+HTH+SC-CONTROL"];
    assert_eq!(sc.ranked, PROTEINS);
    assert_eq!(sc.unmapped, 0);
    assert_eq!(sc.subset, 3);

    for name in [
        "tidy.parquet",
        "tidy.csv",
        "anova_omnibus.csv",
        "tukey_p_values.csv",
        "log2_fold_changes.csv",
        "pca_loadings.csv",
        "ranked_HI+HTH+SC-CONTROL.csv",
        "ora_HI+HTH+SC-CONTROL.csv",
        "gsea_HI+HTH+SC-CONTROL.csv",
    ] {
        assert!(results.join(name).exists(), "{name} missing");
    }
    for artifact in &summary.artifacts {
        assert!(artifact.exists(), "{} missing", artifact.display());
    }

    // Ranked list is led by one of the SC-raised proteins.
    let ranked = fs::read_to_string(results.join("ranked_HI+HTH+SC-CONTROL.csv")).unwrap();
    let mut lines = ranked.lines();
    assert_eq!(lines.next(), Some("kegg_id,log2_fc"));
    let top = lines.next().unwrap().split(',').next().unwrap().to_string();
    assert!([kegg(0), kegg(1), kegg(2)].contains(&top));

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn unmapped_accession_stops_the_run() {
    let dir = fixture_dir("unmapped");
    let settings = write_inputs(&dir, PROTEINS - 1);

    let err = pipeline::run(&settings, &dir.join("results"), &ProgressBar::hidden()).unwrap_err();
    assert!(matches!(err, PipelineError::IdentifierMappingFailure(_)));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn enrichment_is_skipped_without_mapping() -> Result<()> {
    let dir = fixture_dir("no_mapping");
    let mut settings = write_inputs(&dir, PROTEINS);
    settings.enrichment.id_mapping_path = None;

    let summary = pipeline::run(&settings, &dir.join("results"), &ProgressBar::hidden())?;
    assert!(summary.enrichment.is_empty());
    assert!(summary.tested_proteins > 0);

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn missing_abundance_path_is_a_config_error() {
    let settings = Settings::default();
    let dir = fixture_dir("no_input");
    let err = pipeline::run(&settings, &dir.join("results"), &ProgressBar::hidden()).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    let _ = fs::remove_dir_all(&dir);
}
