//! Filter expressions for fetches and orphan-deletion scopes

use crate::{ObjectId, Primitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A boolean filter over the properties of a persisted object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Attribute holds exactly this value.
    Equals { attribute: String, value: Primitive },
    /// Attribute holds one of these values.
    In {
        attribute: String,
        values: Vec<Primitive>,
    },
    /// Relationship (to-one or to-many) references this object.
    Related {
        relationship: String,
        object: ObjectId,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Anything a [`Predicate`] can be evaluated against.
pub trait PredicateSubject {
    fn attribute_value(&self, name: &str) -> Option<&Primitive>;
    fn references(&self, relationship: &str, object: ObjectId) -> bool;
}

impl Predicate {
    pub fn eq(attribute: impl Into<String>, value: impl Into<Primitive>) -> Self {
        Predicate::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn is_in(attribute: impl Into<String>, values: Vec<Primitive>) -> Self {
        Predicate::In {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn related(relationship: impl Into<String>, object: ObjectId) -> Self {
        Predicate::Related {
            relationship: relationship.into(),
            object,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut any) => {
                any.push(other);
                Predicate::Or(any)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    pub fn evaluate(&self, subject: &impl PredicateSubject) -> bool {
        match self {
            Predicate::Equals { attribute, value } => {
                subject.attribute_value(attribute) == Some(value)
            }
            Predicate::In { attribute, values } => subject
                .attribute_value(attribute)
                .map_or(false, |v| values.contains(v)),
            Predicate::Related {
                relationship,
                object,
            } => subject.references(relationship, *object),
            Predicate::Not(inner) => !inner.evaluate(subject),
            Predicate::And(all) => all.iter().all(|p| p.evaluate(subject)),
            Predicate::Or(any) => any.iter().any(|p| p.evaluate(subject)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals { attribute, value } => write!(f, "{attribute} == {value}"),
            Predicate::In { attribute, values } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{attribute} IN {{{}}}", values.join(", "))
            }
            Predicate::Related {
                relationship,
                object,
            } => write!(f, "{relationship} -> {object}"),
            Predicate::Not(inner) => write!(f, "NOT ({inner})"),
            Predicate::And(all) => join(f, all, " AND "),
            Predicate::Or(any) => join(f, any, " OR "),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[Predicate], separator: &str) -> fmt::Result {
    let parts: Vec<String> = parts.iter().map(ToString::to_string).collect();
    write!(f, "({})", parts.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Subject {
        attributes: HashMap<&'static str, Primitive>,
        course: Option<ObjectId>,
    }

    impl PredicateSubject for Subject {
        fn attribute_value(&self, name: &str) -> Option<&Primitive> {
            self.attributes.get(name)
        }

        fn references(&self, relationship: &str, object: ObjectId) -> bool {
            relationship == "course" && self.course == Some(object)
        }
    }

    fn subject() -> Subject {
        Subject {
            attributes: HashMap::from([("id", Primitive::Integer(2)), ("name", "B".into())]),
            course: Some(ObjectId::new(7)),
        }
    }

    #[test]
    fn test_evaluate_compound() {
        let s = subject();
        assert!(Predicate::eq("id", 2).evaluate(&s));
        assert!(!Predicate::eq("id", 3).evaluate(&s));
        assert!(Predicate::is_in("id", vec![1.into(), 2.into()]).evaluate(&s));
        assert!(!Predicate::is_in("missing", vec![1.into()]).evaluate(&s));
        assert!(Predicate::related("course", ObjectId::new(7))
            .and(Predicate::eq("name", "B"))
            .evaluate(&s));
        assert!(Predicate::eq("id", 9).or(Predicate::eq("id", 2)).evaluate(&s));
        assert!(Predicate::eq("id", 9).not().evaluate(&s));
    }

    #[test]
    fn test_display() {
        let p = Predicate::related("course", ObjectId::new(7))
            .and(Predicate::is_in("id", vec![1.into(), 2.into()]).not());
        assert_eq!(p.to_string(), "(course -> #7 AND NOT (id IN {1, 2}))");
    }
}
