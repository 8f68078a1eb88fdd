//! Grouping pass over page-level siblings.
//!
//! Runs after the content stages: consecutive list items fold into a
//! `ListGroup`, and a figure/picture/table plus its adjacent caption fold
//! into the matching group type. Group blocks are fresh insertions; the
//! members keep their ids and become the group's children.

use crate::block::{Block, BlockId, BlockKind, BlockType};
use crate::builders::Builder;
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::geometry::PolygonBox;
use crate::provider::PageProvider;
use tracing::debug;

enum PlanItem {
    Keep(BlockId),
    Group(BlockKind, Vec<BlockId>),
}

fn group_kind_for(block_type: BlockType) -> Option<BlockKind> {
    match block_type {
        BlockType::Figure => Some(BlockKind::FigureGroup),
        BlockType::Picture => Some(BlockKind::PictureGroup),
        BlockType::Table => Some(BlockKind::TableGroup),
        _ => None,
    }
}

/// Decide the new top-level ordering for one page.
///
/// `siblings` is the current structure list with each id's resolved type.
fn plan_groups(siblings: &[(BlockId, BlockType)]) -> Vec<PlanItem> {
    let mut plan = Vec::new();
    let mut i = 0;
    while i < siblings.len() {
        let (id, block_type) = siblings[i];

        if block_type == BlockType::ListItem {
            let mut members = vec![id];
            while i + 1 < siblings.len() && siblings[i + 1].1 == BlockType::ListItem {
                i += 1;
                members.push(siblings[i].0);
            }
            plan.push(PlanItem::Group(BlockKind::ListGroup, members));
        } else if let Some(kind) = group_kind_for(block_type) {
            let mut members = vec![id];
            if i + 1 < siblings.len() && siblings[i + 1].1 == BlockType::Caption {
                i += 1;
                members.push(siblings[i].0);
            }
            plan.push(PlanItem::Group(kind, members));
        } else if block_type == BlockType::Caption
            && i + 1 < siblings.len()
            && group_kind_for(siblings[i + 1].1).is_some()
        {
            // Caption above its figure: group caption-first so reading order
            // is preserved.
            let kind = group_kind_for(siblings[i + 1].1).unwrap_or(BlockKind::FigureGroup);
            let members = vec![id, siblings[i + 1].0];
            i += 1;
            plan.push(PlanItem::Group(kind, members));
        } else {
            plan.push(PlanItem::Keep(id));
        }
        i += 1;
    }
    plan
}

pub struct StructureBuilder;

impl Builder for StructureBuilder {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        let page_ids: Vec<usize> = document.pages.iter().map(|p| p.page_id).collect();

        for page_id in page_ids {
            let Some(page) = document.page(page_id) else { continue };
            let siblings: Vec<(BlockId, BlockType)> = page
                .structure
                .iter()
                .filter(|id| page.contains_block(**id))
                .map(|id| (*id, id.block_type))
                .collect();
            let plan = plan_groups(&siblings);

            let Some(page) = document.page_mut(page_id) else { continue };
            let mut new_structure = Vec::with_capacity(plan.len());
            for item in plan {
                match item {
                    PlanItem::Keep(id) => new_structure.push(id),
                    PlanItem::Group(kind, members) => {
                        let polygon = members
                            .iter()
                            .filter_map(|id| page.get_block(*id).ok())
                            .map(|b| b.polygon.clone())
                            .reduce(|a, b| a.union(&b))
                            .unwrap_or_else(|| PolygonBox::from_bbox(0.0, 0.0, 0.0, 0.0));
                        let mut group = Block::new(page_id, polygon, kind);
                        group.structure = members;
                        let group_id = page.add_full_block(group);
                        debug!("page {page_id}: grouped into {group_id}");
                        new_structure.push(group_id);
                    }
                }
            }
            page.structure = new_structure;
        }

        Ok(Vec::new())
    }
}
