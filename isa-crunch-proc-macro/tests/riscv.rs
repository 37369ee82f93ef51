//
// Copyright (C) 2023 Ariel Abreu
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use pretty_assertions::assert_eq;

mod rv {
	pub struct State {
		pub x: [u64; 32],
		pub f: [f64; 32],
		pub mem: Vec<u8>,
		pub events: Vec<&'static str>,
	}

	impl State {
		pub fn new(size: usize) -> Self {
			Self {
				x: [0; 32],
				f: [0.0; 32],
				mem: vec![0; size],
				events: Vec::new(),
			}
		}

		pub fn x(&self, reg: u8) -> u64 {
			self.x[reg as usize]
		}

		pub fn set_x(&mut self, reg: u8, value: u64) {
			if reg != 0 {
				self.x[reg as usize] = value;
			}
		}

		fn bytes<const N: usize>(&self, addr: u64) -> [u8; N] {
			let start = addr as usize;
			self.mem[start..start + N].try_into().unwrap()
		}

		pub fn load_u32(&self, addr: u64) -> u32 {
			u32::from_le_bytes(self.bytes(addr))
		}

		pub fn load_u64(&self, addr: u64) -> u64 {
			u64::from_le_bytes(self.bytes(addr))
		}

		pub fn store_u32(&mut self, addr: u64, value: u32) {
			let start = addr as usize;
			self.mem[start..start + 4].copy_from_slice(&value.to_le_bytes());
		}

		pub fn trap(&mut self, cause: &'static str) {
			self.events.push(cause);
		}

		pub fn reference(&mut self, what: &'static str) {
			self.events.push(what);
		}

		/// The word at `pc` and how many of its bytes lie inside memory.
		pub fn fetch(&self, pc: u64) -> (u32, usize) {
			let start = pc as usize;
			let available = self.mem.len().saturating_sub(start).min(4);
			let mut word = [0; 4];
			word[..available].copy_from_slice(&self.mem[start..start + available]);
			(u32::from_le_bytes(word), available)
		}
	}

	isa_crunch_proc_macro::include_isa!(state = State, "../isa-crunch/isa/riscv.isa");
}

use rv::*;

fn run(state: &mut State, mut pc: u64) -> u64 {
	for _ in 0..1000 {
		if !state.events.is_empty() {
			return pc;
		}

		let (word, available) = state.fetch(pc);
		let insn = decode(word, available);
		pc = match execute(state, &insn, pc) {
			Step::Next(next) | Step::Transfer(next) => next,
			Step::Illegal => panic!("illegal instruction {:#010x} at {:#x}", word, pc),
		};
	}
	panic!("program did not finish");
}

fn load(program: &[(u32, usize)], size: usize) -> State {
	let mut state = State::new(size);
	let mut offset = 0;
	for &(word, bytes) in program {
		state.mem[offset..offset + bytes].copy_from_slice(&word.to_le_bytes()[..bytes]);
		offset += bytes;
	}
	state
}

#[test]
fn decodes_standard_instructions() {
	let insn = decode(0x00c58533, 4);
	assert_eq!(
		insn,
		Insn {
			opcode: Opcode::add,
			rd: 10,
			rs1: 11,
			rs2: 12,
			rs3: NOREG,
			immed: 0,
		}
	);

	let insn = decode(0xfe000ee3, 4);
	assert_eq!(insn.opcode, Opcode::beq);
	assert_eq!((insn.rs1, insn.rs2), (0, 0));
	assert_eq!(insn.immed, -4);

	assert_eq!(decode(0x0080006f, 4).immed, 8);
	assert_eq!(decode(0x12345537, 4).immed, 0x12345000);
	assert_eq!(decode(0x6ac58543, 4).rs3, 13);
}

#[test]
fn decodes_compressed_instructions() {
	let insn = decode(0x41c8, 2);
	assert_eq!(insn.opcode, Opcode::c_lw);
	assert_eq!((insn.rd, insn.rs1, insn.immed), (10, 11, 4));
	assert_eq!(insn.bytes(), 2);

	let insn = decode(0x0808, 2);
	assert_eq!(insn.opcode, Opcode::c_addi4spn);
	assert_eq!((insn.rd, insn.rs1, insn.immed), (10, 2, 16));

	assert_eq!(decode(0xbff5, 2).immed, -4);
	assert_eq!(decode(0x157d, 2).immed, -1);
	assert_eq!(decode(0x0001, 2).opcode, Opcode::c_nop);
}

#[test]
fn sentinels() {
	assert_eq!(decode(0x0513, 2), Insn::sentinel(Opcode::ILLEGAL));
	assert_eq!(decode(0xffffffff, 4), Insn::sentinel(Opcode::UNKNOWN));
	assert_eq!(Insn::default().opcode, Opcode::ZERO);
	assert_eq!(disasm(&decode(0xffffffff, 4)), "UNKNOWN");

	let mut state = State::new(16);
	assert_eq!(execute(&mut state, &Insn::sentinel(Opcode::ILLEGAL), 0), Step::Illegal);
	assert_eq!(execute(&mut state, &Insn::default(), 0), Step::Illegal);
}

#[test]
fn disassembles() {
	for (word, available, text) in [
		(0xfff50513, 4, "addi a0,a0,-1 (0xffffffff)"),
		(0x00c58533, 4, "add a0,a1,a2"),
		(0x00351513, 4, "slli a0,a0,3 (0x3)"),
		(0x12345537, 4, "lui a0,305418240 (0x12345000)"),
		(0xfea12e23, 4, "sw a0,-4(sp) (0xfffffffc)"),
		(0x6ac58543, 4, "fmadd.d fa0,fa1,fa2,fa3"),
		(0x00000073, 4, "ecall"),
		(0x41c8, 2, "c.lw a0,4(a1) (0x4)"),
		(0x2588, 2, "c.fld fa0,8(a1) (0x8)"),
		(0x0808, 2, "c.addi4spn a0,sp,16 (0x10)"),
		(0xbff5, 2, "c.j -4 (0xfffffffc)"),
		(0x0001, 2, "c.nop"),
	] {
		assert_eq!(disasm(&decode(word, available)), text, "{:#010x}", word);
	}
}

#[test]
fn opcode_metadata() {
	assert_eq!(NUMBER_OF_OPCODES, 35);
	assert_eq!(LAST_COMPRESSED_OPCODE, Opcode::c_add);
	assert_eq!(Opcode::ALL[0], Opcode::ZERO);
	assert_eq!(Opcode::ALL[NUMBER_OF_OPCODES - 1], Opcode::UNKNOWN);
	assert_eq!(OP_NAME[Opcode::fence_i as usize], "fence.i");
	assert_eq!(Opcode::fadd_d.name(), "fadd.d");

	assert!(Opcode::c_addi4spn.is_compressed());
	assert!(Opcode::c_add.is_compressed());
	assert!(!Opcode::lui.is_compressed());
	assert!(!Opcode::ZERO.is_compressed());

	assert_eq!(Opcode::mul.required_isa(), Isa::M);
	assert_eq!(Opcode::c_fld.required_isa(), Isa::C | Isa::D);
	assert!(Opcode::c_fld.attributes().contains(Attr::LD));
	assert!(Opcode::cust_mac.attributes().contains(Attr::CUSTOM));
	assert!(Opcode::c_jalr.attributes().contains(Attr::REFERENCE));
	assert!(Opcode::ZERO.attributes().is_empty());

	assert!(Opcode::ecall.stop_before() && Opcode::ecall.stop_after());
	assert!(Opcode::fence_i.stop_before() && !Opcode::fence_i.stop_after());
	// reference-model transfers always end a block
	assert!(!Opcode::c_jalr.stop_before() && Opcode::c_jalr.stop_after());
	assert!(!Opcode::jal.stop_after());

	assert_eq!(fields::rd(0x00351513), 10);
	assert_eq!(fields::rs1(0x00351513), 10);
}

#[test]
fn runs_a_loop() {
	// a1 = 5 + 4 + 3 + 2 + 1; a1 -= 2; a0 = a1; ecall
	let mut state = load(
		&[
			(0x00500513, 4),
			(0x00000593, 4),
			(0x00a585b3, 4),
			(0xfff50513, 4),
			(0xfe051ce3, 4),
			(0x15f9, 2),
			(0x852e, 2),
			(0x00000073, 4),
		],
		64,
	);

	let pc = run(&mut state, 0);

	assert_eq!(pc, 28);
	assert_eq!(state.x[11], 13);
	assert_eq!(state.x[10], 13);
	assert_eq!(state.events, vec!["ecall"]);
}

#[test]
fn memory_access() {
	let mut state = State::new(64);
	state.x[2] = 64;
	state.x[10] = 0xdead_beef;

	let sw = decode(0xfea12e23, 4);
	assert_eq!(execute(&mut state, &sw, 0), Step::Next(4));
	assert_eq!(state.load_u32(60), 0xdead_beef);

	// sign-extending word load through the compressed form
	state.x[11] = 56;
	let lw = decode(0x41c8, 2);
	assert_eq!(execute(&mut state, &lw, 4), Step::Next(6));
	assert_eq!(state.x[10], 0xffff_ffff_dead_beef);

	state.x[11] = 16;
	state.mem[24..32].copy_from_slice(&1.5f64.to_bits().to_le_bytes());
	let fld = decode(0x2588, 2);
	execute(&mut state, &fld, 6);
	assert_eq!(state.f[10], 1.5);
}

#[test]
fn control_transfers() {
	let mut state = State::new(16);

	let jal = decode(0x010000ef, 4);
	assert_eq!(execute(&mut state, &jal, 0x100), Step::Transfer(0x110));
	assert_eq!(state.x[1], 0x104);

	// taken, then falling through
	state.x[10] = 1;
	let bne = decode(0xfe051ce3, 4);
	assert_eq!(execute(&mut state, &bne, 0x20), Step::Transfer(0x18));
	state.x[10] = 0;
	assert_eq!(execute(&mut state, &bne, 0x20), Step::Next(0x24));

	// the reference form updates pc and hands it back
	state.x[12] = 0x201;
	let jalr = decode(0x9602, 2);
	assert_eq!(jalr.opcode, Opcode::c_jalr);
	assert_eq!(execute(&mut state, &jalr, 0x40), Step::Transfer(0x200));
	assert_eq!(state.x[1], 0x42);

	let jr = decode(0x8082, 2);
	assert_eq!(execute(&mut state, &jr, 0x200), Step::Transfer(0x42));
}

#[test]
fn reference_and_custom_actions() {
	let mut state = State::new(16);

	let fence = decode(0x0000100f, 4);
	assert_eq!(execute(&mut state, &fence, 8), Step::Next(12));
	assert_eq!(state.events, vec!["fence.i"]);

	state.x[10] = 1;
	state.x[11] = 2;
	state.x[12] = 3;
	let mac = decode(0x00c5850b, 4);
	assert_eq!(mac.opcode, Opcode::cust_mac);
	execute(&mut state, &mac, 0);
	assert_eq!(state.x[10], 7);

	state.f[11] = 2.0;
	state.f[12] = 3.0;
	state.f[13] = 1.0;
	execute(&mut state, &decode(0x6ac58543, 4), 0);
	assert_eq!(state.f[10], 7.0);
}

#[test]
fn x0_stays_zero() {
	let mut state = State::new(16);
	// addi x0, x0, 5
	execute(&mut state, &decode(0x00500013, 4), 0);
	assert_eq!(state.x[0], 0);
}
