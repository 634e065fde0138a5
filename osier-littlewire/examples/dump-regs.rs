//! Connect to whatever is on the wire and print its state: part name,
//! baud rate, program counter, and the whole register file.

use osier_dwire::Session;
use osier_littlewire::LittleWire;

fn main() {
    tracing_subscriber::fmt::init();

    let adapter = LittleWire::open().expect("no Little-Wire adapter found");
    let mut session = Session::connect(adapter).expect("could not connect to target");

    println!(
        "{} at {} baud, pc {:#06x}",
        session.device().name,
        session.baud(),
        session.pc
    );

    let mut regs = [0u8; 32];
    session
        .read_addr(0, &mut regs)
        .expect("could not read registers");
    for (i, chunk) in regs.chunks(8).enumerate() {
        println!("r{:<2} {:02x?}", i * 8, chunk);
    }

    session.disable().expect("could not disable debugWIRE");
}
