//! AST visitors over oxc programs.

use oxc_ast::ast::{ComputedMemberExpression, Expression, StaticMemberExpression};
use oxc_ast::visit::walk;
use oxc_ast::Visit;
use std::collections::BTreeSet;

/// Collects the keys of every member access whose object is exactly the
/// identifier `object`: `object.key` and `object["key"]`. Aliases, computed
/// non-literal keys and template keys are not followed.
pub(crate) struct MemberKeys<'o> {
    object: &'o str,
    keys: BTreeSet<String>,
}

impl<'o> MemberKeys<'o> {
    pub(crate) fn new(object: &'o str) -> Self {
        Self {
            object,
            keys: BTreeSet::new(),
        }
    }

    pub(crate) fn into_keys(self) -> BTreeSet<String> {
        self.keys
    }

    fn is_object(&self, expression: &Expression<'_>) -> bool {
        matches!(expression, Expression::Identifier(ident) if ident.name.as_str() == self.object)
    }
}

impl<'a, 'o> Visit<'a> for MemberKeys<'o> {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if self.is_object(&it.object) {
            self.keys.insert(it.property.name.to_string());
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_computed_member_expression(&mut self, it: &ComputedMemberExpression<'a>) {
        if self.is_object(&it.object) {
            if let Expression::StringLiteral(key) = &it.expression {
                self.keys.insert(key.value.to_string());
            }
        }
        walk::walk_computed_member_expression(self, it);
    }
}
