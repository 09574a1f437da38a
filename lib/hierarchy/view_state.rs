use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::tree::CourseHierarchy;

/// An expandable node of the course outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeKey {
    Chapter(i64),
    Lesson(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineKind {
    Chapter,
    Lesson,
    Content,
    Exercise,
}

/// One renderable line of the flattened outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineRow {
    pub depth: usize,
    pub kind: OutlineKind,
    pub id: i64,
    pub order: i64,
    pub label: String,
    /// `Some(is_expanded)` for chapters and lessons, `None` for leaves.
    pub expanded: Option<bool>,
}

/// Per-session navigation state for one editor: which course is open and which
/// outline nodes are expanded.
///
/// Owned by the caller and passed explicitly; it is never shared between
/// sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyViewState {
    current_course: Option<i64>,
    expanded: BTreeSet<NodeKey>,
}

impl HierarchyViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_course(&self) -> Option<i64> {
        self.current_course
    }

    /// Opens a course. Switching to a different course collapses everything.
    pub fn select_course(&mut self, course_id: i64) {
        if self.current_course != Some(course_id) {
            self.expanded.clear();
        }
        self.current_course = Some(course_id);
    }

    pub fn clear_course(&mut self) {
        self.current_course = None;
        self.expanded.clear();
    }

    pub fn is_expanded(&self, key: NodeKey) -> bool {
        self.expanded.contains(&key)
    }

    pub fn expand(&mut self, key: NodeKey) {
        self.expanded.insert(key);
    }

    pub fn collapse(&mut self, key: NodeKey) {
        self.expanded.remove(&key);
    }

    /// Flips one node and returns its new state.
    pub fn toggle(&mut self, key: NodeKey) -> bool {
        if self.expanded.remove(&key) {
            false
        } else {
            self.expanded.insert(key);
            true
        }
    }

    pub fn expanded_nodes(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.expanded.iter().copied()
    }

    /// Drops expanded keys that no longer exist in a freshly loaded hierarchy.
    ///
    /// A hierarchy for some other course clears the selection instead. Returns
    /// the number of keys removed.
    pub fn prune(&mut self, hierarchy: &CourseHierarchy) -> usize {
        let before = self.expanded.len();
        if self.current_course != Some(hierarchy.course.course_id) {
            self.clear_course();
            return before;
        }

        let mut present = BTreeSet::new();
        for chapter in &hierarchy.chapters {
            present.insert(NodeKey::Chapter(chapter.chapter.chapter_id));
            for lesson in &chapter.lessons {
                present.insert(NodeKey::Lesson(lesson.lesson.lesson_id));
            }
        }
        self.expanded.retain(|key| present.contains(key));
        before - self.expanded.len()
    }

    /// Flattens the hierarchy into depth-annotated rows, descending only into
    /// expanded chapters and lessons.
    ///
    /// Under an expanded chapter its lessons come first, then its chapter-level
    /// exercises. Under an expanded lesson its contents come first, then its
    /// exercises.
    pub fn visible_outline(&self, hierarchy: &CourseHierarchy) -> Vec<OutlineRow> {
        let mut rows = Vec::new();
        if self.current_course != Some(hierarchy.course.course_id) {
            return rows;
        }

        for chapter_node in &hierarchy.chapters {
            let chapter = &chapter_node.chapter;
            let chapter_open = self.is_expanded(NodeKey::Chapter(chapter.chapter_id));
            rows.push(OutlineRow {
                depth: 0,
                kind: OutlineKind::Chapter,
                id: chapter.chapter_id,
                order: chapter.chapter_order,
                label: chapter.chapter_name.clone(),
                expanded: Some(chapter_open),
            });
            if !chapter_open {
                continue;
            }

            for lesson_node in &chapter_node.lessons {
                let lesson = &lesson_node.lesson;
                let lesson_open = self.is_expanded(NodeKey::Lesson(lesson.lesson_id));
                rows.push(OutlineRow {
                    depth: 1,
                    kind: OutlineKind::Lesson,
                    id: lesson.lesson_id,
                    order: lesson.lesson_order,
                    label: lesson.lesson_name.clone(),
                    expanded: Some(lesson_open),
                });
                if !lesson_open {
                    continue;
                }

                rows.extend(lesson_node.contents.iter().map(|content| OutlineRow {
                    depth: 2,
                    kind: OutlineKind::Content,
                    id: content.content_id,
                    order: content.content_order,
                    label: content
                        .content_title
                        .clone()
                        .unwrap_or_else(|| content.content_type.clone()),
                    expanded: None,
                }));
                rows.extend(
                    lesson_node
                        .exercises
                        .iter()
                        .map(|exercise| exercise_row(2, exercise)),
                );
            }

            rows.extend(
                chapter_node
                    .exercises
                    .iter()
                    .map(|exercise| exercise_row(1, exercise)),
            );
        }

        rows
    }
}

fn exercise_row(depth: usize, exercise: &crate::catalog::CodingExercise) -> OutlineRow {
    OutlineRow {
        depth,
        kind: OutlineKind::Exercise,
        id: exercise.exercise_id,
        order: exercise.exercise_order,
        label: exercise.title.clone(),
        expanded: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Chapter, CodingExercise, Course, Lesson, LessonContent};
    use crate::hierarchy::tree::{ChapterNode, LessonNode};

    fn hierarchy(course_id: i64) -> CourseHierarchy {
        let lesson = |id: i64, order: i64| LessonNode {
            lesson: Lesson {
                lesson_id: id,
                chapter_id: 10,
                lesson_name: format!("Lesson {id}"),
                lesson_order: order,
            },
            contents: vec![LessonContent {
                content_id: id * 100,
                lesson_id: id,
                content_type: "theory".to_string(),
                content_order: 1,
                content_title: None,
                body: "text".to_string(),
                code_language: None,
                code_explanation: None,
            }],
            exercises: Vec::new(),
        };

        CourseHierarchy {
            course: Course {
                course_id,
                course_name: "Rust".to_string(),
                main_language: "rust".to_string(),
                course_description: None,
                course_image: None,
                difficulty_level: "Beginner".to_string(),
                is_active: true,
            },
            chapters: vec![
                ChapterNode {
                    chapter: Chapter {
                        chapter_id: 10,
                        course_id,
                        chapter_name: "Basics".to_string(),
                        chapter_order: 1,
                    },
                    lessons: vec![lesson(20, 1), lesson(21, 2)],
                    exercises: vec![CodingExercise {
                        exercise_id: 30,
                        lesson_id: None,
                        chapter_id: Some(10),
                        exercise_order: 1,
                        title: "Quiz".to_string(),
                        instruction: "answer".to_string(),
                        difficulty: "Easy".to_string(),
                        starter_code: None,
                        solution_code: None,
                        programming_language: None,
                    }],
                },
                ChapterNode {
                    chapter: Chapter {
                        chapter_id: 11,
                        course_id,
                        chapter_name: "Traits".to_string(),
                        chapter_order: 2,
                    },
                    lessons: Vec::new(),
                    exercises: Vec::new(),
                },
            ],
            anomalies: Vec::new(),
        }
    }

    fn shape(rows: &[OutlineRow]) -> Vec<(usize, OutlineKind, i64)> {
        rows.iter().map(|row| (row.depth, row.kind, row.id)).collect()
    }

    #[test]
    fn collapsed_outline_shows_only_chapters() {
        let mut state = HierarchyViewState::new();
        let tree = hierarchy(1);
        assert!(state.visible_outline(&tree).is_empty());

        state.select_course(1);
        assert_eq!(
            shape(&state.visible_outline(&tree)),
            vec![(0, OutlineKind::Chapter, 10), (0, OutlineKind::Chapter, 11)]
        );
    }

    #[test]
    fn expanded_nodes_descend_in_order() {
        let mut state = HierarchyViewState::new();
        state.select_course(1);
        assert!(state.toggle(NodeKey::Chapter(10)));
        state.expand(NodeKey::Lesson(21));

        let rows = state.visible_outline(&hierarchy(1));
        assert_eq!(
            shape(&rows),
            vec![
                (0, OutlineKind::Chapter, 10),
                (1, OutlineKind::Lesson, 20),
                (1, OutlineKind::Lesson, 21),
                (2, OutlineKind::Content, 2100),
                (1, OutlineKind::Exercise, 30),
                (0, OutlineKind::Chapter, 11),
            ]
        );
        assert_eq!(rows[3].label, "theory");
        assert_eq!(rows[0].expanded, Some(true));
        assert_eq!(rows[1].expanded, Some(false));
        assert_eq!(rows[4].expanded, None);

        assert!(!state.toggle(NodeKey::Chapter(10)));
        assert_eq!(state.visible_outline(&hierarchy(1)).len(), 2);
        // The lesson stays expanded underneath the collapsed chapter.
        assert!(state.is_expanded(NodeKey::Lesson(21)));
    }

    #[test]
    fn switching_course_resets_expansion() {
        let mut state = HierarchyViewState::new();
        state.select_course(1);
        state.expand(NodeKey::Chapter(10));
        state.select_course(1);
        assert!(state.is_expanded(NodeKey::Chapter(10)));

        state.select_course(2);
        assert_eq!(state.current_course(), Some(2));
        assert_eq!(state.expanded_nodes().count(), 0);

        state.clear_course();
        assert_eq!(state.current_course(), None);
    }

    #[test]
    fn prune_drops_vanished_nodes() {
        let mut state = HierarchyViewState::new();
        state.select_course(1);
        state.expand(NodeKey::Chapter(10));
        state.expand(NodeKey::Lesson(20));
        state.expand(NodeKey::Lesson(99));
        state.collapse(NodeKey::Chapter(10));
        state.expand(NodeKey::Chapter(12));

        assert_eq!(state.prune(&hierarchy(1)), 2);
        assert_eq!(
            state.expanded_nodes().collect::<Vec<_>>(),
            vec![NodeKey::Lesson(20)]
        );

        assert_eq!(state.prune(&hierarchy(7)), 1);
        assert_eq!(state.current_course(), None);
    }

    #[test]
    fn view_state_round_trips_through_json() {
        let mut state = HierarchyViewState::new();
        state.select_course(3);
        state.expand(NodeKey::Lesson(5));

        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "current_course": 3,
                "expanded": [{"kind": "lesson", "id": 5}]
            })
        );
        let back: HierarchyViewState = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, state);
    }
}
