use std::io::Write;

use spellmesh::{Effect, EffectSink};

/// Rings the terminal bell and prints the announcement line.
pub struct ConsoleEffects<W: Write> {
    out: W,
}

impl<W: Write> ConsoleEffects<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> EffectSink for ConsoleEffects<W> {
    fn on_effect(&mut self, effect: &Effect) {
        let written = writeln!(self.out, "\x07>>> {} <<<", effect.announcement())
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            log::warn!("could not announce effect: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spellmesh::SpellId;

    #[test]
    fn announces_with_bell() {
        let mut sink = ConsoleEffects::new(Vec::new());
        sink.on_effect(&Effect {
            spell: SpellId::Shove,
            caster_name: "Alice".to_string(),
            cast_id: "c1".to_string(),
        });

        let text = String::from_utf8(sink.out).unwrap();
        assert_eq!(text, "\x07>>> You are shoved by Alice <<<\n");
    }
}
