//! Structural matching of a compiled pattern against one anchor node.
//!
//! Child patterns match an ordered subsequence of a node's children; other
//! children may sit between them. A quantified child takes the following
//! matching siblings greedily and gives them back one at a time when the
//! rest of the pattern fails.
//!
//! Matching runs in two layers. [`Shapes`] answers whether a pattern node
//! can match a tree node at all; each child list is solved once into a
//! [`Table`], so the answer costs O(patterns x children) per level. The
//! search then walks alignments on an explicit stack, entering only states
//! the tables prove completable, and checks the predicates whenever a full
//! alignment is reached. A failed predicate backtracks like any other
//! mismatch. Long child lists never deepen the call stack; only pattern
//! nesting (bounded at compile time) recurses.

use std::collections::HashMap;
use std::rc::Rc;

use super::pattern::{Binding, CapturePoint, NodeMatcher, Pattern, PatternNode, Quantifier};
use crate::tree::SyntaxNode;

/// Search steps allowed per anchor for a pattern with predicates.
const MAX_SEARCH_STEPS: usize = 1 << 20;

/// Match `pattern` with `node` as its anchor. On success `binds` holds the
/// captures in match order (not yet sorted) and every predicate holds.
pub(crate) fn match_pattern<'t>(
    pattern: &Pattern,
    node: SyntaxNode<'t>,
    binds: &mut Vec<Binding<'t>>,
) -> bool {
    binds.clear();
    let mut shapes = Shapes::default();
    if !shapes.fits(&pattern.root, node) {
        return false;
    }
    if search(pattern, node, &mut shapes, binds) {
        return true;
    }
    binds.clear();
    false
}

fn node_matches(pattern: &PatternNode, node: SyntaxNode<'_>) -> bool {
    match &pattern.matcher {
        NodeMatcher::Any => true,
        NodeMatcher::AnyNamed => node.is_named(),
        NodeMatcher::Kind(kind) => node.is_named() && node.kind() == kind,
        NodeMatcher::Literal(text) => !node.is_named() && node.kind() == text,
        // Resolved by `Shapes::fits`.
        NodeMatcher::Alternation(_) => true,
    }
}

fn field_allows(pattern: &PatternNode, node: SyntaxNode<'_>) -> bool {
    pattern
        .field
        .as_deref()
        .map_or(true, |field| node.field_name() == Some(field))
}

fn bind<'t>(binds: &mut Vec<Binding<'t>>, captures: &[CapturePoint], node: SyntaxNode<'t>) {
    binds.extend(captures.iter().map(|point| Binding {
        seq: point.seq,
        capture: point.index,
        node,
    }));
}

/// The children of one tree node solved against the child patterns of one
/// pattern node.
struct Table<'t> {
    children: Vec<SyntaxNode<'t>>,
    /// First child at or after a position that a child pattern fits.
    next_fit: Vec<Option<usize>>,
    /// Whether the child patterns from `pi` on can match the children from
    /// `ci` on, with `repeating` set inside a repetition.
    completes: Vec<bool>,
}

impl<'t> Table<'t> {
    fn width(&self) -> usize {
        self.children.len() + 1
    }

    fn next_fit(&self, pi: usize, ci: usize) -> Option<usize> {
        self.next_fit[pi * self.width() + ci]
    }

    fn completes(&self, pi: usize, ci: usize, repeating: bool) -> bool {
        self.completes[(pi * self.width() + ci) * 2 + usize::from(repeating)]
    }
}

/// Memoized structural answers for one anchor, keyed by pattern node
/// address and tree node id.
#[derive(Default)]
struct Shapes<'t> {
    fits: HashMap<(usize, usize), bool>,
    tables: HashMap<(usize, usize), Rc<Table<'t>>>,
}

fn pattern_key(pattern: &PatternNode) -> usize {
    pattern as *const PatternNode as usize
}

impl<'t> Shapes<'t> {
    /// Whether `pattern` matches `node` for some alignment of its children,
    /// ignoring predicates.
    fn fits(&mut self, pattern: &PatternNode, node: SyntaxNode<'t>) -> bool {
        let key = (pattern_key(pattern), node.id());
        if let Some(&known) = self.fits.get(&key) {
            return known;
        }

        let head = match &pattern.matcher {
            NodeMatcher::Alternation(alternatives) => {
                alternatives.iter().any(|alternative| self.fits(alternative, node))
            }
            _ => node_matches(pattern, node),
        };
        let fits = head
            && !pattern
                .negated_fields
                .iter()
                .any(|field| node.child_by_field_name(field).is_some())
            && (pattern.children.is_empty() || self.table(pattern, node).completes(0, 0, false));

        self.fits.insert(key, fits);
        fits
    }

    fn table(&mut self, pattern: &PatternNode, node: SyntaxNode<'t>) -> Rc<Table<'t>> {
        let key = (pattern_key(pattern), node.id());
        if let Some(table) = self.tables.get(&key) {
            return Rc::clone(table);
        }

        let patterns = &pattern.children;
        let children: Vec<SyntaxNode<'t>> = node.children().collect();
        let width = children.len() + 1;

        let mut next_fit = vec![None; patterns.len() * width];
        for (pi, child_pattern) in patterns.iter().enumerate() {
            for ci in (0..children.len()).rev() {
                let child = children[ci];
                next_fit[pi * width + ci] =
                    if field_allows(child_pattern, child) && self.fits(child_pattern, child) {
                        Some(ci)
                    } else {
                        next_fit[pi * width + ci + 1]
                    };
            }
        }

        // Solved backwards: a state only depends on later children or
        // later patterns.
        let at = move |pi: usize, ci: usize, repeating: bool| (pi * width + ci) * 2 + usize::from(repeating);
        let mut completes = vec![false; (patterns.len() + 1) * width * 2];
        for ci in 0..width {
            completes[at(patterns.len(), ci, false)] = true;
            completes[at(patterns.len(), ci, true)] = true;
        }
        for (pi, child_pattern) in patterns.iter().enumerate().rev() {
            for ci in (0..width).rev() {
                let next = next_fit[pi * width + ci];
                for repeating in [true, false] {
                    let take = |next_pi: usize, next_repeating: bool| {
                        next.is_some_and(|k| completes[at(next_pi, k + 1, next_repeating)])
                    };
                    let skip = completes[at(pi + 1, ci, false)];
                    let value = match (child_pattern.quantifier, repeating) {
                        (Quantifier::One, _) => take(pi + 1, false),
                        (Quantifier::ZeroOrOne, _) => skip || take(pi + 1, false),
                        (Quantifier::ZeroOrMore, _) | (Quantifier::OneOrMore, true) => {
                            skip || take(pi, true)
                        }
                        (Quantifier::OneOrMore, false) => take(pi, true),
                    };
                    completes[at(pi, ci, repeating)] = value;
                }
            }
        }

        let table = Rc::new(Table {
            children,
            next_fit,
            completes,
        });
        self.tables.insert(key, Rc::clone(&table));
        table
    }
}

/// What follows once a node has matched.
enum Then<'p, 't> {
    Done,
    /// Bind `captures` to `node`, then go on with `then`.
    Bind {
        captures: &'p [CapturePoint],
        node: SyntaxNode<'t>,
        then: Rc<Then<'p, 't>>,
    },
    /// Resume the child sequence of `level`.
    Resume {
        level: Rc<Level<'p, 't>>,
        pi: usize,
        ci: usize,
        repeating: bool,
    },
}

/// A tree node whose children are being aligned with a pattern node's
/// children.
struct Level<'p, 't> {
    pattern: &'p PatternNode,
    node: SyntaxNode<'t>,
    table: Rc<Table<'t>>,
    then: Rc<Then<'p, 't>>,
}

enum Step<'p, 't> {
    /// Match `pattern` at `node`, which it is known to fit.
    Node {
        pattern: &'p PatternNode,
        node: SyntaxNode<'t>,
        then: Rc<Then<'p, 't>>,
    },
    /// Continue with child pattern `pi` at child `ci`; `repeating` is set
    /// after at least one repetition of a quantified pattern.
    Sequence {
        level: Rc<Level<'p, 't>>,
        pi: usize,
        ci: usize,
        repeating: bool,
    },
    /// Match child pattern `pi` at the first fitting child at or after
    /// `from`, then continue with `next_pi`. With `retry`, later fitting
    /// children are tried on backtrack.
    Element {
        level: Rc<Level<'p, 't>>,
        pi: usize,
        from: usize,
        next_pi: usize,
        next_repeating: bool,
        retry: bool,
    },
}

fn search<'p, 't>(
    pattern: &'p Pattern,
    anchor: SyntaxNode<'t>,
    shapes: &mut Shapes<'t>,
    binds: &mut Vec<Binding<'t>>,
) -> bool {
    let bounded = !pattern.predicates.is_empty();
    let mut steps = 0usize;
    let mut stack = vec![(
        Step::Node {
            pattern: &pattern.root,
            node: anchor,
            then: Rc::new(Then::Done),
        },
        0,
    )];

    // Alternatives are pushed lowest priority first.
    while let Some((step, restore)) = stack.pop() {
        if bounded {
            steps += 1;
            if steps > MAX_SEARCH_STEPS {
                tracing::warn!(
                    limit = MAX_SEARCH_STEPS,
                    anchor = anchor.kind(),
                    start = anchor.start_byte(),
                    "pattern search abandoned"
                );
                return false;
            }
        }
        binds.truncate(restore);
        let here = binds.len();

        let next = match step {
            Step::Node {
                pattern,
                node,
                then,
            } => {
                if let NodeMatcher::Alternation(alternatives) = &pattern.matcher {
                    let then = Rc::new(Then::Bind {
                        captures: &pattern.captures,
                        node,
                        then,
                    });
                    for alternative in alternatives.iter().rev() {
                        if shapes.fits(alternative, node) {
                            let then = Rc::clone(&then);
                            stack.push((
                                Step::Node {
                                    pattern: alternative,
                                    node,
                                    then,
                                },
                                here,
                            ));
                        }
                    }
                    continue;
                }
                if pattern.children.is_empty() {
                    bind(binds, &pattern.captures, node);
                    then
                } else {
                    let table = shapes.table(pattern, node);
                    let level = Rc::new(Level {
                        pattern,
                        node,
                        table,
                        then,
                    });
                    stack.push((
                        Step::Sequence {
                            level,
                            pi: 0,
                            ci: 0,
                            repeating: false,
                        },
                        here,
                    ));
                    continue;
                }
            }
            Step::Sequence {
                level,
                pi,
                ci,
                repeating,
            } => {
                let parent: &'p PatternNode = level.pattern;
                if pi == parent.children.len() {
                    bind(binds, &parent.captures, level.node);
                    Rc::clone(&level.then)
                } else {
                    let child_pattern = &parent.children[pi];
                    let element = |next_pi: usize, next_repeating: bool, retry: bool| Step::Element {
                        level: Rc::clone(&level),
                        pi,
                        from: ci,
                        next_pi,
                        next_repeating,
                        retry,
                    };
                    let skip = level.table.completes(pi + 1, ci, false).then(|| Step::Sequence {
                        level: Rc::clone(&level),
                        pi: pi + 1,
                        ci,
                        repeating: false,
                    });
                    match (child_pattern.quantifier, repeating) {
                        (Quantifier::One, _) => stack.push((element(pi + 1, false, true), here)),
                        (Quantifier::ZeroOrOne, _) => {
                            stack.extend(skip.map(|s| (s, here)));
                            stack.push((element(pi + 1, false, true), here));
                        }
                        // Later repetitions take the next fitting sibling; giving
                        // items back happens through `skip`.
                        (Quantifier::ZeroOrMore, _) | (Quantifier::OneOrMore, true) => {
                            stack.extend(skip.map(|s| (s, here)));
                            stack.push((element(pi, true, !repeating), here));
                        }
                        (Quantifier::OneOrMore, false) => stack.push((element(pi, true, true), here)),
                    }
                    continue;
                }
            }
            Step::Element {
                level,
                pi,
                from,
                next_pi,
                next_repeating,
                retry,
            } => {
                let Some(k) = level.table.next_fit(pi, from) else {
                    continue;
                };
                // Completion only gets harder further right.
                if !level.table.completes(next_pi, k + 1, next_repeating) {
                    continue;
                }
                if retry {
                    stack.push((
                        Step::Element {
                            level: Rc::clone(&level),
                            pi,
                            from: k + 1,
                            next_pi,
                            next_repeating,
                            retry,
                        },
                        here,
                    ));
                }
                let parent: &'p PatternNode = level.pattern;
                let child = level.table.children[k];
                let then = Rc::new(Then::Resume {
                    level,
                    pi: next_pi,
                    ci: k + 1,
                    repeating: next_repeating,
                });
                stack.push((
                    Step::Node {
                        pattern: &parent.children[pi],
                        node: child,
                        then,
                    },
                    here,
                ));
                continue;
            }
        };

        let mut then = next;
        loop {
            let rest = match &*then {
                Then::Done => {
                    if pattern.predicates.iter().all(|p| p.holds(binds)) {
                        return true;
                    }
                    break;
                }
                Then::Bind {
                    captures,
                    node,
                    then: rest,
                } => {
                    bind(binds, captures, *node);
                    Rc::clone(rest)
                }
                Then::Resume {
                    level,
                    pi,
                    ci,
                    repeating,
                } => {
                    stack.push((
                        Step::Sequence {
                            level: Rc::clone(level),
                            pi: *pi,
                            ci: *ci,
                            repeating: *repeating,
                        },
                        binds.len(),
                    ));
                    break;
                }
            };
            then = rest;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::query::parser::compile;
    use crate::tree::tests::sample_tree;
    use crate::tree::{NodeSpec, Tree, TreeBuilder};
    use std::time::{Duration, Instant};

    fn grammar() -> Grammar {
        Grammar::new("toy", "toy")
            .with_kinds(
                true,
                [
                    "program",
                    "class_declaration",
                    "identifier",
                    "class_body",
                    "field_declaration",
                    "type_identifier",
                    "list",
                    "item",
                ],
            )
            .with_kinds(false, ["class", "{", "}", ";", ","])
            .with_fields(["name", "body", "type", "declarator"])
    }

    fn captured<'t>(src: &str, node: SyntaxNode<'t>) -> Option<Vec<&'t str>> {
        let compiled = compile(&grammar(), src, 16).unwrap();
        let mut binds = Vec::new();
        if !match_pattern(&compiled.patterns[0], node, &mut binds) {
            return None;
        }
        binds.sort_by_key(|b| b.seq);
        Some(binds.iter().map(|b| b.node.text()).collect())
    }

    fn class(tree: &Tree) -> SyntaxNode<'_> {
        tree.root_node().child(0).unwrap()
    }

    /// `(a, b, c)` as a list of three items separated by commas.
    fn list_tree() -> Tree {
        let source = "a,b,c";
        let mut b = TreeBuilder::new("toy", source);
        b.open(NodeSpec::named("list", 0..5)).unwrap();
        b.leaf(NodeSpec::named("item", 0..1)).unwrap();
        b.leaf(NodeSpec::anonymous(",", 1..2)).unwrap();
        b.leaf(NodeSpec::named("item", 2..3)).unwrap();
        b.leaf(NodeSpec::anonymous(",", 3..4)).unwrap();
        b.leaf(NodeSpec::named("item", 4..5)).unwrap();
        b.close().unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_field_constrained_child() {
        let tree = sample_tree();
        assert_eq!(
            captured("(class_declaration name: (identifier) @n)", class(&tree)),
            Some(vec!["Foo"])
        );
        assert_eq!(
            captured("(class_declaration body: (identifier) @n)", class(&tree)),
            None
        );
    }

    #[test]
    fn test_children_match_with_gaps() {
        let tree = sample_tree();
        // The class keyword and body sit around the identifier.
        assert_eq!(
            captured("(class_declaration \"class\" (class_body \"}\" @close))", class(&tree)),
            Some(vec!["}"])
        );
        // Order matters.
        assert_eq!(
            captured("(class_declaration (class_body) (identifier))", class(&tree)),
            None
        );
    }

    #[test]
    fn test_wildcards() {
        let tree = sample_tree();
        let names = captured("(class_declaration (_) @named)", class(&tree)).unwrap();
        assert_eq!(names, vec!["Foo"]);
        let any = captured("(class_declaration _ @any)", class(&tree)).unwrap();
        assert_eq!(any, vec!["class"]);
    }

    #[test]
    fn test_negated_field() {
        let tree = sample_tree();
        assert!(captured("(class_declaration !body)", class(&tree)).is_none());
        assert!(captured("(class_declaration !type)", class(&tree)).is_some());
    }

    #[test]
    fn test_alternation_binds_first_match() {
        let tree = sample_tree();
        let field = tree
            .walk()
            .find(|n| n.kind() == "field_declaration")
            .unwrap();
        assert_eq!(
            captured("(field_declaration [(identifier) (type_identifier)] @x)", field),
            Some(vec!["int"])
        );
    }

    #[test]
    fn test_quantifiers_are_greedy() {
        let tree = list_tree();
        let list = tree.root_node();
        assert_eq!(captured("(list (item)* @i)", list), Some(vec!["a", "b", "c"]));
        assert_eq!(captured("(list (item)+ @i)", list), Some(vec!["a", "b", "c"]));
        assert_eq!(captured("(list (item)? @i)", list), Some(vec!["a"]));
        assert_eq!(captured("(list (class_body)* @i)", list), Some(vec![]));
        assert_eq!(captured("(list (class_body)+ @i)", list), None);
    }

    #[test]
    fn test_backtracking_frees_children_for_later_patterns() {
        let tree = list_tree();
        let list = tree.root_node();
        // A greedy repetition must give back the last item.
        assert_eq!(
            captured("(list (item)+ @many (item) @last)", list),
            Some(vec!["a", "b", "c"])
        );
        let compiled = compile(&grammar(), "(list (item)+ @many (item) @last)", 16).unwrap();
        let mut binds = Vec::new();
        assert!(match_pattern(&compiled.patterns[0], list, &mut binds));
        let last: Vec<_> = binds.iter().filter(|b| b.capture == 1).map(|b| b.node.text()).collect();
        assert_eq!(last, vec!["c"]);
    }

    #[test]
    fn test_predicates_filter_structural_matches() {
        let tree = list_tree();
        let list = tree.root_node();
        assert_eq!(
            captured(r#"((list (item) @i) (#eq? @i "a"))"#, list),
            Some(vec!["a"])
        );
        // A failed predicate moves on to the next alignment.
        assert_eq!(
            captured(r#"((list (item) @i) (#eq? @i "b"))"#, list),
            Some(vec!["b"])
        );
        assert_eq!(captured(r#"((list (item) @i) (#eq? @i "z"))"#, list), None);
        assert_eq!(
            captured(r#"((list (item)* @i) (#match? @i "^[a-c]$"))"#, list),
            Some(vec!["a", "b", "c"])
        );
        assert_eq!(
            captured(r#"((list (item)* @i) (#not-any-of? @i "x" "y"))"#, list),
            Some(vec!["a", "b", "c"])
        );
        // The repetition gives back "c" to satisfy the predicate.
        assert_eq!(
            captured(r#"((list (item)* @i) (#any-of? @i "a" "b"))"#, list),
            Some(vec!["a", "b"])
        );
        assert_eq!(
            captured(r#"((list (item)+ @i) (#any-of? @i "b" "c"))"#, list),
            Some(vec!["b", "c"])
        );
    }

    #[test]
    fn test_predicates_backtrack_into_nested_children() {
        // (list (list a) (list b))
        let source = "ab";
        let mut b = TreeBuilder::new("toy", source);
        b.open(NodeSpec::named("list", 0..2)).unwrap();
        b.open(NodeSpec::named("list", 0..1)).unwrap();
        b.leaf(NodeSpec::named("item", 0..1)).unwrap();
        b.close().unwrap();
        b.open(NodeSpec::named("list", 1..2)).unwrap();
        b.leaf(NodeSpec::named("item", 1..2)).unwrap();
        b.close().unwrap();
        b.close().unwrap();
        let tree = b.finish().unwrap();

        assert_eq!(
            captured(r#"((list (list (item) @i) @inner) (#eq? @i "b"))"#, tree.root_node()),
            Some(vec!["b", "b"])
        );
        assert_eq!(
            captured(r#"((list (list (item) @i)) (#not-eq? @i "a"))"#, tree.root_node()),
            Some(vec!["b"])
        );
    }

    #[test]
    fn test_capture_to_capture_equality() {
        let tree = list_tree();
        let list = tree.root_node();
        assert!(captured(r#"((list (item) @a (item) @b) (#eq? @a @b))"#, list).is_none());
        assert!(captured(r#"((list (item) @a (item) @b) (#not-eq? @a @b))"#, list).is_some());
    }

    fn wide_list(count: usize) -> Tree {
        let source = "x".repeat(count);
        let mut b = TreeBuilder::new("toy", source.as_str());
        b.open(NodeSpec::named("list", 0..count)).unwrap();
        for i in 0..count {
            b.leaf(NodeSpec::named("item", i..i + 1)).unwrap();
        }
        b.close().unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_failing_repetition_tail_is_not_exponential() {
        let tree = wide_list(200);
        let started = Instant::now();
        assert_eq!(captured("(list (item)* (class_body))", tree.root_node()), None);
        assert_eq!(captured("(list (item)+ @i (item) (class_body))", tree.root_node()), None);
        assert_eq!(
            captured(r#"((list (item)* @i (class_body)) (#eq? @i "x"))"#, tree.root_node()),
            None
        );
        let found = captured("(list (item)* @i (item) @last)", tree.root_node()).unwrap();
        assert_eq!(found.len(), 200);
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_predicate_search_over_many_alignments() {
        let tree = wide_list(60);
        let started = Instant::now();
        // Every pair of items is tried and none satisfies the predicate.
        assert_eq!(
            captured(r#"((list (item) @a (item) @b) (#not-eq? @a @b))"#, tree.root_node()),
            None
        );
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_long_child_lists_do_not_recurse() {
        let count = 20_000;
        let tree = wide_list(count);
        let texts = captured("(list (item)* @i)", tree.root_node()).unwrap();
        assert_eq!(texts.len(), count);
    }
}
