//! End-to-end pipeline scenarios over the fixture profiles.

use std::path::PathBuf;

use strata::{
    assemble_chunks, build_manifest, chunk_document, detect_boundaries, document_manifest,
    draft_entries, filter_boundaries, Error, LineRange, Manifest, ManifestEntry, PageRange,
    Profile,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn xj() -> Profile {
    Profile::load(fixture("xj_1999_profile.yaml")).unwrap()
}

/// One entry spanning the whole document.
fn single_entry(document_id: &str) -> Manifest {
    Manifest {
        document_id: document_id.to_string(),
        entries: vec![ManifestEntry {
            chunk_id: format!("{document_id}::proc"),
            level: 3,
            level_name: "procedure".to_string(),
            title: "Test Procedure".to_string(),
            hierarchy_path: vec![
                "Test Group".to_string(),
                "Test Section".to_string(),
                "Test Procedure".to_string(),
            ],
            content_type: "procedure".to_string(),
            page_range: PageRange { start: 0, end: 0 },
            line_range: LineRange { start: 0, end: None },
            vehicle_applicability: Vec::new(),
            engine_applicability: Vec::new(),
            drivetrain_applicability: Vec::new(),
            has_safety_callouts: Vec::new(),
            figure_references: Vec::new(),
            cross_references: Vec::new(),
            parent_chunk_id: None,
            children: Vec::new(),
        }],
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[test]
fn fixture_profiles_load() {
    for name in [
        "xj_1999_profile.yaml",
        "cj_universal_profile.yaml",
        "tm9_8014_profile.yaml",
    ] {
        let profile = Profile::load(fixture(name));
        assert!(profile.is_ok(), "{name}: {:?}", profile.err());
    }
}

#[test]
fn invalid_profile_reports_everything() {
    let err = Profile::load(fixture("invalid_profile.yaml")).unwrap_err();
    let messages = match err {
        Error::InvalidProfile(messages) => messages,
        other => panic!("expected InvalidProfile, got {other:?}"),
    };
    let all = messages.join("\n");
    for needle in [
        "schema_version",
        "missing required field: manual_title",
        "source_format",
        "at least one vehicle is required",
        "hierarchy levels must be sequential",
        "id_pattern at hierarchy level 1",
        "invalid callout level 'danger'",
        "invalid callout style 'banner'",
        "min_tokens",
    ] {
        assert!(all.contains(needle), "missing '{needle}' in:\n{all}");
    }
}

#[test]
fn missing_profile_is_not_found() {
    let err = Profile::load(fixture("does_not_exist.yaml")).unwrap_err();
    assert!(matches!(err, Error::ProfileNotFound(_)));
}

// =============================================================================
// End to end
// =============================================================================

#[test]
fn cooling_system_scenario() {
    let profile = xj();
    let page = "7 Cooling System\n\nSERVICE PROCEDURES\n\nRADIATOR DRAINING\n\n\
                WARNING: DO NOT REMOVE THE CAP WHILE HOT.\n\n(1) Step one.\n(2) Step two.";

    let boundaries = detect_boundaries(&[page], &profile);
    let levels: Vec<usize> = boundaries.iter().map(|b| b.level).collect();
    assert_eq!(levels, vec![1, 2, 3]);
    assert_eq!(boundaries[0].id.as_deref(), Some("7"));
    assert_eq!(boundaries[0].title.as_deref(), Some("Cooling System"));

    let chunks = chunk_document(&[page], &profile);
    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.chunk_id, "xj-1999::7::SERVICE PROCEDURES::RADIATOR DRAINING");
    assert!(chunk.text.contains("WARNING: DO NOT REMOVE THE CAP WHILE HOT."));
    assert!(chunk.text.contains("(1) Step one."));
    assert!(chunk.text.contains("(2) Step two."));
    assert_eq!(chunk.meta_str("level1_id"), Some("7"));
    assert_eq!(chunk.meta_list("has_safety_callouts"), vec!["warning"]);
    assert_eq!(
        chunk.meta_list("hierarchy_path"),
        vec!["Cooling System", "SERVICE PROCEDURES", "RADIATOR DRAINING"]
    );
}

#[test]
fn no_structure_yields_no_chunks() {
    let profile = xj();
    let pages = ["just some prose\nwith no headings at all"];
    assert!(document_manifest(&pages, &profile).is_empty());
    assert!(chunk_document(&pages, &profile).is_empty());
}

#[test]
fn multipage_offsets_are_global() {
    let profile = xj();
    let pages = [
        "0 Lubrication and Maintenance\n\nIntroduction to maintenance procedures for the vehicle.",
        "JUMP STARTING PROCEDURE\n\n(1) Connect positive cable.\n(2) Connect negative cable.",
    ];

    let boundaries = detect_boundaries(&pages, &profile);
    assert_eq!(boundaries.len(), 2);
    assert_eq!((boundaries[1].page, boundaries[1].line), (1, 3));

    let manifest = build_manifest(&filter_boundaries(&boundaries, &profile, &pages), &profile);
    let drafts = draft_entries(&pages, &manifest, &profile);
    let procedure = drafts
        .iter()
        .find(|d| d.chunk_id.ends_with("JUMP STARTING PROCEDURE"))
        .unwrap();
    assert!(procedure.text.starts_with("JUMP STARTING PROCEDURE"));
    assert!(procedure.text.contains("Connect positive cable"));
    assert!(!procedure.text.contains("Introduction"));
    assert_eq!((procedure.pages.start, procedure.pages.end), (1, 1));

    let chunks = assemble_chunks(&pages, &manifest, &profile);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata["page_range"], serde_json::json!({"start": 0, "end": 1}));
}

#[test]
fn tiny_sections_collapse_into_one_chunk() {
    let profile = xj();
    let mut page = String::from("7 Cooling System\n");
    for heading in ["COOLANT LEVEL", "DRAIN PLUG", "HOSE CLAMPS", "FAN BELT", "WATER PUMP"] {
        page.push_str(&format!("\n{heading}\n\nInspect before every trip.\n"));
    }

    let manifest = document_manifest(&[page.as_str()], &profile);
    assert_eq!(manifest.len(), 6);

    let chunks = chunk_document(&[page.as_str()], &profile);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].chunk_id.ends_with("WATER PUMP"));
    assert_eq!(chunks[0].text.matches("Inspect before every trip.").count(), 5);
}

#[test]
fn merge_stops_at_level1_boundary() {
    let profile = xj();
    let page = "7 Cooling System\n\nCheck coolant.\n\n9 Engine\n\nCheck oil.";
    let chunks = chunk_document(&[page], &profile);
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["xj-1999::7", "xj-1999::9"]);
}

#[test]
fn skipped_sections_are_not_assembled() {
    let profile = xj();
    let page = "7 Cooling System\n\nbody text.\n\n8W Wiring Diagrams\n\nwire text.\n\n9 Engine\n\nengine text.";

    let manifest = document_manifest(&[page], &profile);
    assert!(manifest.get("xj-1999::8W").is_some());

    let chunks = chunk_document(&[page], &profile);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| !c.chunk_id.starts_with("xj-1999::8W")));
    assert!(chunks.iter().all(|c| !c.text.contains("wire text")));
}

#[test]
fn unknown_group_ids_are_filtered() {
    let profile = xj();
    let page = "7 Cooling System\n\nbody\n\n42 Bolts required for the bracket\n\nmore body";
    let detected = detect_boundaries(&[page], &profile);
    let kept = filter_boundaries(&detected, &profile, &[page]);
    assert_eq!(detected.len(), 2);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id.as_deref(), Some("7"));
}

// =============================================================================
// Rule ordering
// =============================================================================

#[test]
fn warning_stays_with_its_procedure() {
    let profile = xj();
    let page = "WARNING: DO NOT REMOVE THE RADIATOR CAP WHILE THE\n\
                ENGINE IS HOT. SCALDING COOLANT AND STEAM CAN CAUSE\n\
                SERIOUS BURNS TO THE SKIN AND EYES.\n\
                \n\
                (1) Allow the engine to cool completely.\n\
                (2) Place a rag over the radiator cap.\n\
                (3) Slowly rotate the cap to the first stop.\n\
                (4) Allow residual pressure to escape.\n\
                (5) Press down and rotate the cap to remove.";

    let chunks = assemble_chunks(&[page], &single_entry("xj-1999"), &profile);
    let warning: Vec<_> = chunks.iter().filter(|c| c.text.contains("WARNING:")).collect();
    assert_eq!(warning.len(), 1);
    assert!(warning[0].text.contains("(1)"));
    assert!(warning[0].text.contains("(5)"));
}

#[test]
fn steps_survive_before_size_split() {
    let profile = xj();
    let steps: Vec<String> = (1..=10)
        .map(|i| format!("({i}) Perform step {i} of the oil change procedure carefully."))
        .collect();
    let page = format!("OIL CHANGE PROCEDURE\n\n{}", steps.join("\n"));

    let chunks = assemble_chunks(&[page.as_str()], &single_entry("xj-1999"), &profile);
    let with_first: Vec<_> = chunks.iter().filter(|c| c.text.contains("(1)")).collect();
    assert_eq!(with_first.len(), 1);
    for i in 1..=10 {
        assert!(with_first[0].text.contains(&format!("({i})")));
    }
}

#[test]
fn spec_table_stays_whole_in_small_budget() {
    let mut spec = strata::ProfileSpec::from_yaml_str(
        &std::fs::read_to_string(fixture("xj_1999_profile.yaml")).unwrap(),
    )
    .unwrap();
    spec.chunking.min_tokens = 4;
    spec.chunking.max_tokens = 20;
    let profile = Profile::compile(spec).unwrap();

    let table = "Engine Oil Capacity:\n\
                 2.5L I4 .............. 4 quarts (with filter change)\n\
                 4.0L I6 .............. 6 quarts (with filter change)\n\
                 Coolant Capacity:\n\
                 2.5L I4 .............. 9.0 quarts\n\
                 4.0L I6 .............. 10.0 quarts";

    let chunks = assemble_chunks(&[table], &single_entry("xj-1999"), &profile);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("Engine Oil Capacity:"));
    assert!(chunks[0].text.contains("10.0 quarts"));
    assert!(chunks[0].meta_list("engine_applicability").contains(&"4.0L I6"));
}

// =============================================================================
// Other manual styles
// =============================================================================

#[test]
fn cj_lettered_paragraphs() {
    let profile = Profile::load(fixture("cj_universal_profile.yaml")).unwrap();
    let page = "'Jeep' UNIVERSAL SERIES SERVICE MANUAL\n\
                \n\
                B Lubrication and Periodic Services\n\
                \n\
                B-1. General\n\
                The proper lubrication of all working parts is essential to\n\
                the satisfactory performance and long life of the vehicle.\n\
                \n\
                B-4. Engine Lubrication System - Hurricane F4 Engine\n\
                a. The engine oil lubricates all internal moving parts of the\n\
                engine under pressure from the oil pump.\n\
                b. Check the oil level daily using the dipstick on the right\n\
                side of the engine.\n\
                \n\
                Caution: Always use the grade of oil specified for the ambient\n\
                temperature range. Refer to Par. B-3 for specifications.\n\
                \n\
                FIG. B-1 - Engine Lubrication System Diagram";

    let ids: Vec<Option<String>> = detect_boundaries(&[page], &profile)
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(
        ids,
        vec![Some("B".into()), Some("B-1".into()), Some("B-4".into())]
    );

    let chunks = chunk_document(&[page], &profile);
    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.chunk_id, "cj-universal::B::B-4");
    assert_eq!(chunk.meta_str("level1_id"), Some("B"));
    assert!(chunk.meta_list("engine_applicability").contains(&"Hurricane F4"));
    assert!(chunk.meta_list("has_safety_callouts").contains(&"caution"));
    assert_eq!(chunk.meta_list("figure_references"), vec!["B-1"]);
    assert_eq!(chunk.meta_list("cross_references"), vec!["cj-universal::B-3"]);
}

#[test]
fn tm9_chapter_section_paragraph() {
    let profile = Profile::load(fixture("tm9_8014_profile.yaml")).unwrap();
    let page = "TM 9-8014\n\
                \n\
                CHAPTER 2. OPERATING INSTRUCTIONS\n\
                \n\
                Section III. Operation Under Usual Conditions\n\
                \n\
                42. Starting the Engine\n\
                a. Set the parking brake.\n\
                b. Place the shift lever in neutral.\n\
                (1) Pull the choke control out fully if the engine is cold.\n\
                (2) Turn the ignition switch to the ON position.\n\
                \n\
                Note. If the engine fails to start after three attempts,\n\
                refer to par. 81b for troubleshooting procedures.\n\
                \n\
                43. Movement of Vehicle\n\
                a. Release the parking brake.\n\
                b. Depress the clutch pedal fully.";

    let manifest = document_manifest(&[page], &profile);
    let ids: Vec<&str> = manifest.entries.iter().map(|e| e.chunk_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "tm9-8014-m38a1::2",
            "tm9-8014-m38a1::2::III",
            "tm9-8014-m38a1::2::III::42",
            "tm9-8014-m38a1::2::III::43",
        ]
    );
    assert_eq!(manifest.entries[2].title, "Starting the Engine");

    let chunks = chunk_document(&[page], &profile);
    let all_refs: Vec<&str> = chunks
        .iter()
        .flat_map(|c| c.meta_list("cross_references"))
        .collect();
    assert!(all_refs.contains(&"tm9-8014-m38a1::81"));
    assert!(chunks.iter().all(|c| c.meta_str("level1_id") == Some("2")));
}
