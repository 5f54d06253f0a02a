// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response PDUs sent by a slave.

use super::{byte_count, check_count, encode};
use crate::{
    error::{Error, Result},
    frame::{Address, EXCEPTION_FLAG, FunctionCode, Pdu, Quantity, Word},
    util::{bool_to_u16_coil, pack_coils},
};

pub const MAX_COILS: usize = 2000;
pub const MAX_REGISTERS: usize = 125;

/// Exception response: `[function | 0x80, code]`.
pub fn exception(function: FunctionCode, code: u8) -> Result<Pdu> {
    if code == 0 {
        return Err(Error::invalid_argument("Exception code must not be zero"));
    }
    encode(2, |w| {
        w.put_u8(function.value() | EXCEPTION_FLAG)?.put_u8(code)?;
        Ok(())
    })
}

fn bits_response(code: FunctionCode, states: &[bool]) -> Result<Pdu> {
    check_count("coils", states.len(), 0, MAX_COILS)?;
    let packed = pack_coils(states);
    let count = byte_count(packed.len())?;
    encode(2 + packed.len(), |w| {
        w.put_u8(code.value())?.put_u8(count)?.put_bytes(&packed)?;
        Ok(())
    })
}

fn registers_response(code: FunctionCode, registers: &[Word]) -> Result<Pdu> {
    check_count("registers", registers.len(), 0, MAX_REGISTERS)?;
    let count = byte_count(registers.len() * 2)?;
    encode(2 + registers.len() * 2, |w| {
        w.put_u8(code.value())?.put_u8(count)?;
        for register in registers {
            w.put_u16(*register)?;
        }
        Ok(())
    })
}

fn echo(code: FunctionCode, address: Address, value: Word) -> Result<Pdu> {
    encode(5, |w| {
        w.put_u8(code.value())?.put_u16(address)?.put_u16(value)?;
        Ok(())
    })
}

pub fn read_coils(states: &[bool]) -> Result<Pdu> {
    bits_response(FunctionCode::ReadCoils, states)
}

pub fn read_discrete_inputs(states: &[bool]) -> Result<Pdu> {
    bits_response(FunctionCode::ReadDiscreteInputs, states)
}

pub fn read_holding_registers(registers: &[Word]) -> Result<Pdu> {
    registers_response(FunctionCode::ReadHoldingRegisters, registers)
}

pub fn read_input_registers(registers: &[Word]) -> Result<Pdu> {
    registers_response(FunctionCode::ReadInputRegisters, registers)
}

pub fn read_write_multiple_registers(registers: &[Word]) -> Result<Pdu> {
    registers_response(FunctionCode::ReadWriteMultipleRegisters, registers)
}

/// Echo of the written coil.
pub fn write_single_coil(address: Address, state: bool) -> Result<Pdu> {
    echo(FunctionCode::WriteSingleCoil, address, bool_to_u16_coil(state))
}

pub fn write_single_register(address: Address, value: Word) -> Result<Pdu> {
    echo(FunctionCode::WriteSingleRegister, address, value)
}

pub fn write_multiple_coils(address: Address, quantity: Quantity) -> Result<Pdu> {
    echo(FunctionCode::WriteMultipleCoils, address, quantity)
}

pub fn write_multiple_registers(address: Address, quantity: Quantity) -> Result<Pdu> {
    echo(FunctionCode::WriteMultipleRegisters, address, quantity)
}

pub fn mask_write_register(address: Address, and_mask: Word, or_mask: Word) -> Result<Pdu> {
    encode(7, |w| {
        w.put_u8(FunctionCode::MaskWriteRegister.value())?
            .put_u16(address)?
            .put_u16(and_mask)?
            .put_u16(or_mask)?;
        Ok(())
    })
}

pub fn read_exception_status(status: u8) -> Result<Pdu> {
    encode(2, |w| {
        w.put_u8(FunctionCode::ReadExceptionStatus.value())?
            .put_u8(status)?;
        Ok(())
    })
}

pub fn get_comm_event_counter(status: Word, event_count: Word) -> Result<Pdu> {
    echo(FunctionCode::GetCommEventCounter, status, event_count)
}
