use crate::types::{ModId, WorkshopId};

/// What an import feed looks like after it has been consumed.
pub const IMPORT_FEED_TEMPLATE: &str = "\
# modweave import feed
#
# Add one block per workshop item. Blocks are merged into the registry on the
# next run with --write, after which this file is reset to this template.
#
#   Workshop ID: <number>
#   Mod ID: <id>        (optional, repeatable: enable exactly these ids)
#   ---
";

/// One workshop-item block from the import feed.
///
/// An empty `mod_ids` list means "make sure the unit is known, leave its
/// enablement alone"; a non-empty list is an explicit selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBlock {
    pub workshop_id: WorkshopId,
    pub mod_ids: Vec<ModId>,
}

impl ImportBlock {
    pub fn has_selection(&self) -> bool {
        !self.mod_ids.is_empty()
    }
}

/// Parse the import feed into blocks, in file order.
///
/// A block starts at a `Workshop ID:` line and ends at a `---` line or at the
/// next `Workshop ID:` line, so both the delimited format and the legacy
/// undelimited one are accepted. Blank lines and `#` comments are skipped;
/// `Mod ID:` lines outside a block are ignored.
pub fn parse_import_feed(input: &str) -> Vec<ImportBlock> {
    let mut blocks: Vec<ImportBlock> = Vec::new();
    let mut open = false;

    for raw in input.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "---" {
            open = false;
            continue;
        }
        if let Some(value) = labelled_value(line, &["workshop", "id"]) {
            if let Some(id) = value.split_whitespace().next() {
                blocks.push(ImportBlock {
                    workshop_id: WorkshopId::new(id),
                    mod_ids: Vec::new(),
                });
                open = true;
            }
            continue;
        }
        if !open {
            continue;
        }
        if let Some(value) = labelled_value(line, &["mod", "id"]) {
            let Some(block) = blocks.last_mut() else {
                continue;
            };
            if !value.is_empty() && !block.mod_ids.iter().any(|m| *m == *value) {
                block.mod_ids.push(ModId::new(value));
            }
        }
    }
    blocks
}

/// Match `<words...> : value` case-insensitively, tolerating any whitespace
/// between the label words and around the colon.
fn labelled_value<'a>(line: &'a str, label: &[&str]) -> Option<&'a str> {
    let (head, value) = line.split_once(':')?;
    let mut words = head.split_whitespace();
    for expected in label {
        if !words.next()?.eq_ignore_ascii_case(expected) {
            return None;
        }
    }
    if words.next().is_some() {
        return None;
    }
    Some(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delimited_blocks() {
        let feed = "Workshop ID: 100\nMod ID: A\nMod ID: A2\n---\n\nWorkshop ID: 200\n---\n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].workshop_id, "100");
        assert_eq!(blocks[0].mod_ids, vec![ModId::from("A"), ModId::from("A2")]);
        assert!(!blocks[1].has_selection());
    }

    #[test]
    fn parses_legacy_undelimited_blocks() {
        let feed = "workshop id : 100\nmod id: A\n\nWORKSHOP ID:200\nMOD ID:B\n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].workshop_id, "200");
        assert_eq!(blocks[1].mod_ids, vec![ModId::from("B")]);
    }

    #[test]
    fn mod_ids_after_terminator_are_ignored() {
        let feed = "Workshop ID: 100\n---\nMod ID: stray\n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].mod_ids.is_empty());
    }

    #[test]
    fn duplicate_mod_ids_keep_first_position() {
        let feed = "Workshop ID: 1\nMod ID: B\nMod ID: A\nMod ID: B\n---\n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks[0].mod_ids, vec![ModId::from("B"), ModId::from("A")]);
    }

    #[test]
    fn mod_ids_keep_inner_spaces() {
        let feed = "Workshop ID: 1\nMod ID:  Authentic Z - Current  \n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks[0].mod_ids[0], "Authentic Z - Current");
    }

    #[test]
    fn comments_and_unrelated_lines_are_skipped() {
        let feed = "# header\nWorkshop ID: 1 # trailing\nName: ignored\nMod ID: X\n";
        let blocks = parse_import_feed(feed);
        assert_eq!(blocks[0].workshop_id, "1");
        assert_eq!(blocks[0].mod_ids, vec![ModId::from("X")]);
    }

    #[test]
    fn template_parses_to_nothing() {
        assert!(parse_import_feed(IMPORT_FEED_TEMPLATE).is_empty());
    }

    #[test]
    fn label_must_match_exactly() {
        assert!(labelled_value("Workshop IDs: 1", &["workshop", "id"]).is_none());
        assert!(labelled_value("Workshop ID extra: 1", &["workshop", "id"]).is_none());
    }
}
