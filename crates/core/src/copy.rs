use crate::node::Node;

/// Identity-cleared copy of `node`. Scalars are copied verbatim; only the
/// relations the schema marks `deep_copy` are followed, recursively.
pub fn deep_copy(node: &Node) -> Node {
    let schema = node.schema();
    let mut copy = Node::new(node.kind);
    copy.fields = node.fields.clone();

    for (name, target) in &node.one {
        if schema.relation(name).is_some_and(|r| r.deep_copy) {
            copy.one.insert(name, Box::new(deep_copy(target)));
        }
    }
    for (name, items) in &node.many {
        if schema.relation(name).is_some_and(|r| r.deep_copy) {
            copy.many.insert(name, items.iter().map(deep_copy).collect());
        }
    }
    copy
}
