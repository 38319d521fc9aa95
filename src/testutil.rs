#![cfg(test)]

use crate::dict::Pronunciations;
use crate::lattice::io::{parse_fsm, parse_slf};
use crate::lattice::{Lattice, LatticeFormat, LatticeInfo};

pub const PRONS: &str = "\
HELLO 2 hh ah l ow
HI 1 hh ay
WORLD 1 w er l d
WORD 1 w er d
A 1 ah
";

/// Two words in sequence, with node times.
pub const HELLO_WORLD_SLF: &str = "\
VERSION=1.0
UTTERANCE=hello_world
lmscale=1.0
N=3 L=2
I=0 t=0.0
I=1 t=0.5
I=2 t=1.0
J=0 S=0 E=1 W=HELLO a=-1.0 n=0 r=0
J=1 S=1 E=2 W=WORLD a=-1.0 n=0 r=0
";

/// As [`HELLO_WORLD_SLF`] with a weaker HI competing with HELLO.
pub const HELLO_HI_WORLD_SLF: &str = "\
VERSION=1.0
UTTERANCE=hello_world
N=3 L=3
I=0 t=0.0
I=1 t=0.5
I=2 t=1.0
J=0 S=0 E=1 W=HELLO a=-1.0 n=0 r=0
J=1 S=1 E=2 W=WORLD a=-1.0 n=0 r=0
J=2 S=0 E=1 W=HI a=-2.0 n=0 r=0
";

/// Sentence markers on nodes, numbering not topological and no times.
///
/// Sorted, this becomes `0 -START-> 1 -{HELLO,HI}-> 2 -{WORLD,WORD}-> 3 -END-> 4`
/// with links in the order START, HELLO, HI, WORLD, WORD, END.
pub const SHUFFLED_SLF: &str = "\
# generated
N=5 L=6
I=0 W=!SENT_END
I=1 W=!SENT_START
I=2
I=3
I=4
J=0 S=1 E=3 W=HELLO a=-1.0
J=1 S=3 E=2 W=WORLD a=-1.0
J=2 S=3 E=2 W=WORD a=-2.0
J=3 S=2 E=0 a=-0.5
J=4 S=4 E=1 a=0
J=5 S=1 E=3 W=HI a=-3.0
";

/// The same competition as [`HELLO_HI_WORLD_SLF`] as an FSM with two final states.
pub const HELLO_WORLD_FSM: &str = "\
# from to word score
0 1 HELLO -1.0
0 1 HI -2.0
1 2 WORLD -1.0
1 3 WORD -3.0
2
3 -0.5
";

pub fn prons() -> Pronunciations {
    Pronunciations::from_text(PRONS).unwrap()
}

pub fn slf(text: &str, prons: &mut Pronunciations) -> Lattice {
    parse_slf(text, LatticeInfo::new("test.lat", LatticeFormat::Slf), prons).unwrap()
}

pub fn fsm(text: &str, prons: &mut Pronunciations) -> Lattice {
    parse_fsm(text, LatticeInfo::new("test.fsm", LatticeFormat::Fsm), prons).unwrap()
}

/// Parse, score with the acoustic score alone and run Forward-Backward.
pub fn scored_slf(text: &str, prons: &mut Pronunciations) -> Lattice {
    let mut lat = slf(text, prons);
    lat.compute_link_scores(0.0, 0.0, 0.0, 1.0);
    lat.do_forward_backward().unwrap();
    lat
}
